//! `flowledger.toml` configuration: scan settings and monitored instances.

use crate::error::ConfigError;
use crate::instance::{Environment, Instance};
use crate::scanner::ScanOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_ENV: &str = "FLOWLEDGER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "flowledger.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowLedgerConfig {
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Listing pages a single fetch is budgeted for.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Maximum number of instances scanned at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Response cache lifetime; 0 disables the cache.
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    crate::scanner::DEFAULT_MAX_PAGES
}

fn default_concurrency() -> usize {
    4
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            cache_ttl_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub id: String,
    pub name: Option<String>,
    pub url: String,
    pub api_key: Option<String>,
    /// Name of an environment variable holding the API key.
    pub api_key_env: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_true() -> bool {
    true
}

/// Load `.env` from the working directory or its parents, if present.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Config file to use: an explicit path wins, then `$FLOWLEDGER_CONFIG`,
/// then `flowledger.toml` in the working directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

impl FlowLedgerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &path.display().to_string())?;
        debug!(path = %path.display(), instances = config.instances.len(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: FlowLedgerConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let mut seen = HashSet::new();
        for instance in &config.instances {
            if !seen.insert(instance.id.as_str()) {
                return Err(ConfigError::DuplicateInstance(instance.id.clone()));
            }
        }
        Ok(config)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            timeout: Duration::from_secs(self.scan.timeout_secs.max(1)),
            max_pages: self.scan.max_pages.max(1),
        }
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.scan.cache_ttl_secs > 0).then(|| Duration::from_secs(self.scan.cache_ttl_secs))
    }

    /// Resolve every configured instance, reading API keys from the process
    /// environment where `api_key_env` is set.
    pub fn instances(&self) -> Result<Vec<Instance>, ConfigError> {
        self.instances_with(|var| std::env::var(var).ok())
    }

    pub fn instances_with<F>(&self, lookup: F) -> Result<Vec<Instance>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.instances.iter().map(|cfg| cfg.resolve(&lookup)).collect()
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceConfig> {
        self.instances.iter().find(|i| i.id == id)
    }
}

impl InstanceConfig {
    /// Build an [`Instance`]. An inline `api_key` takes precedence over
    /// `api_key_env`.
    pub fn resolve<F>(&self, lookup: &F) -> Result<Instance, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match (&self.api_key, &self.api_key_env) {
            (Some(key), _) if !key.is_empty() => key.clone(),
            (_, Some(var)) => lookup(var.as_str())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar {
                    instance: self.id.clone(),
                    var: var.clone(),
                })?,
            _ => {
                return Err(ConfigError::MissingApiKey {
                    instance: self.id.clone(),
                })
            }
        };

        let mut instance = Instance::new(
            &self.id,
            self.name.as_deref().unwrap_or(&self.id),
            &self.url,
            &api_key,
            self.environment,
        );
        instance.is_active = self.is_active;
        Ok(instance)
    }
}
