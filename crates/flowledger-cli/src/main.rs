mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowledger_core::alert;
use flowledger_core::config::{self, FlowLedgerConfig};
use flowledger_core::fleet;
use flowledger_core::instance::{Environment, Instance};
use flowledger_core::providers::cache::CachedSource;
use flowledger_core::providers::n8n_api::N8nClient;
use flowledger_core::providers::WorkflowSource;
use flowledger_core::scanner::{self, ScanOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "flowledger",
    version,
    about = "FlowLedger — n8n workflow security tracker",
    long_about = "Scan n8n instances for plaintext secrets, deprecated nodes, weak authentication and risky credential usage.\n\nInstances are read from flowledger.toml (or $FLOWLEDGER_CONFIG)."
)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan configured instances for security findings
    Scan {
        /// Only scan the instance with this id
        #[arg(short, long)]
        instance: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Include instances marked inactive
        #[arg(long)]
        all: bool,
    },

    /// List an instance's workflows with their lifecycle status
    Workflows {
        /// Instance id from the config file
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that an n8n URL and API key work
    TestConnection {
        /// Base URL of the n8n instance
        #[arg(long)]
        url: String,

        /// API key for the public API
        #[arg(long)]
        api_key: String,
    },

    /// Compare an instance's n8n version with the latest release
    Version {
        /// Instance id from the config file
        id: String,
    },

    /// Scan an instance and render the notification it would send
    Alert {
        /// Instance id from the config file
        id: String,

        /// Print the HTML body instead of plain text
        #[arg(long)]
        html: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "flowledger=debug" } else { "flowledger=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Some(path) = config::load_dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }

    match cli.command {
        Commands::Scan { instance, format, all } => {
            let config = load_config(cli.config)?;
            cmd_scan(&config, instance.as_deref(), &format, all).await
        }
        Commands::Workflows { id, format } => {
            let config = load_config(cli.config)?;
            cmd_workflows(&config, &id, &format).await
        }
        Commands::TestConnection { url, api_key } => cmd_test_connection(&url, &api_key).await,
        Commands::Version { id } => {
            let config = load_config(cli.config)?;
            cmd_version(&config, &id).await
        }
        Commands::Alert { id, html } => {
            let config = load_config(cli.config)?;
            cmd_alert(&config, &id, html).await
        }
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<FlowLedgerConfig> {
    let path = config::config_path(explicit.as_deref());
    FlowLedgerConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn find_instance(config: &FlowLedgerConfig, id: &str) -> Result<Instance> {
    let entry = config
        .instance(id)
        .with_context(|| format!("No instance with id '{}' in config", id))?;
    entry
        .resolve(&|var: &str| std::env::var(var).ok())
        .with_context(|| format!("Invalid configuration for instance '{}'", id))
}

fn build_source(config: &FlowLedgerConfig) -> Result<Arc<dyn WorkflowSource>> {
    let client = N8nClient::new(config.scan_options().timeout).context("Failed to build HTTP client")?;
    let source: Arc<dyn WorkflowSource> = match config.cache_ttl() {
        Some(ttl) => Arc::new(CachedSource::new(client, ttl)),
        None => Arc::new(client),
    };
    Ok(source)
}

async fn cmd_scan(
    config: &FlowLedgerConfig,
    only: Option<&str>,
    format: &str,
    include_inactive: bool,
) -> Result<()> {
    let instances = match only {
        Some(id) => vec![find_instance(config, id)?],
        None => {
            let all = config
                .instances()
                .context("Failed to resolve configured instances")?;
            let (selected, skipped): (Vec<_>, Vec<_>) =
                all.into_iter().partition(|i| include_inactive || i.is_active);
            for instance in &skipped {
                debug!(instance = %instance.id, "skipping inactive instance");
            }
            selected
        }
    };

    if instances.is_empty() {
        anyhow::bail!("No instances to scan. Add [[instances]] entries to the config file.");
    }

    let source = build_source(config)?;
    let outcomes = fleet::scan_all(
        source,
        instances,
        config.scan_options(),
        config.scan.concurrency,
    )
    .await;
    let report = fleet::aggregate(&outcomes);

    match format {
        "json" => {
            let reports: Vec<_> = outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().ok())
                .collect();
            let json = serde_json::json!({
                "fleet": report,
                "reports": reports,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            for outcome in &outcomes {
                if let Ok(scan) = &outcome.result {
                    display::print_scan_report(scan);
                }
            }
            if outcomes.len() > 1 || report.has_failures() {
                display::print_fleet_report(&report);
            }
        }
    }

    if report.failed_instances == report.instance_stats.total {
        anyhow::bail!("All {} instance scan(s) failed", report.failed_instances);
    }
    if report.has_failures() {
        warn!(failed = report.failed_instances, "some instances could not be scanned");
    }
    Ok(())
}

async fn cmd_workflows(config: &FlowLedgerConfig, id: &str, format: &str) -> Result<()> {
    let instance = find_instance(config, id)?;
    let source = build_source(config)?;
    let report = scanner::scan_instance(source.as_ref(), &instance, &config.scan_options())
        .await
        .with_context(|| format!("Failed to scan instance '{}'", id))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report.workflows)?),
        _ => display::print_workflows(&report),
    }
    Ok(())
}

async fn cmd_test_connection(url: &str, api_key: &str) -> Result<()> {
    let instance = Instance::new("adhoc", url, url, api_key, Environment::Development);
    let client = N8nClient::new(ScanOptions::default().timeout).context("Failed to build HTTP client")?;
    let check = client.test_connection(&instance).await;
    display::print_connection_check(url, &check);
    if !check.connected {
        anyhow::bail!("Connection test failed");
    }
    Ok(())
}

async fn cmd_version(config: &FlowLedgerConfig, id: &str) -> Result<()> {
    let instance = find_instance(config, id)?;
    let client = N8nClient::new(config.scan_options().timeout).context("Failed to build HTTP client")?;

    let current = match client.detect_version(&instance).await {
        Some(v) => Some(v),
        None => instance.version.clone(),
    };
    let latest = match client.fetch_latest_version().await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "could not fetch latest n8n version");
            None
        }
    };

    display::print_version_status(&instance, current.as_deref(), latest.as_deref());
    Ok(())
}

async fn cmd_alert(config: &FlowLedgerConfig, id: &str, html: bool) -> Result<()> {
    let instance = find_instance(config, id)?;
    let source = build_source(config)?;
    let report = scanner::scan_instance(source.as_ref(), &instance, &config.scan_options())
        .await
        .with_context(|| format!("Failed to scan instance '{}'", id))?;

    let rendered = if report.stats.active_findings > 0 {
        alert::security_alert(&instance.name, &report.findings)
    } else {
        alert::scan_completion(&instance.name, &report)
    };

    if html {
        println!("{}", rendered.html);
    } else {
        display::print_alert(&rendered);
    }
    Ok(())
}
