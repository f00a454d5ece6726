use colored::*;
use flowledger_core::alert::Alert;
use flowledger_core::analyzer::report::{ScanReport, SecurityFinding, Severity};
use flowledger_core::classifier::WorkflowStatus;
use flowledger_core::fleet::{FleetReport, InstanceScanStatus};
use flowledger_core::instance::{Environment, Instance};
use flowledger_core::parser::credential::CredentialSource;
use flowledger_core::providers::n8n_api::ConnectionCheck;

fn count_colored(count: usize, severity: Severity) -> String {
    if count == 0 {
        return "0".to_string();
    }
    match severity {
        Severity::Critical => count.to_string().red().bold().to_string(),
        Severity::High => count.to_string().yellow().bold().to_string(),
        _ => count.to_string(),
    }
}

fn environment_tag(environment: Environment) -> ColoredString {
    environment.label().color(environment.color_code())
}

/// Print one instance's scan report to the terminal.
pub fn print_scan_report(report: &ScanReport) {
    println!();
    println!(
        "{}",
        format!(
            " FlowLedger v{} — Scanning {}",
            env!("CARGO_PKG_VERSION"),
            report.instance_name
        )
        .bold()
    );
    println!();

    let w = &report.stats.workflows;
    println!(" {}", "Workflows".bold().underline());
    println!(" {} {} total", "|-".dimmed(), w.total);
    println!(
        " {} {} active, {} inactive, {} archived",
        "|-".dimmed(),
        w.active.to_string().green(),
        w.inactive,
        w.archived.to_string().dimmed()
    );
    println!(
        " {} Credentials: {} listed, {} referenced{}",
        "|-".dimmed(),
        report.stats.total_credentials,
        report.stats.unique_credential_references,
        if report.credentials_available {
            String::new()
        } else {
            " (credentials endpoint unavailable)".yellow().to_string()
        }
    );
    println!();

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    if report.findings.is_empty() {
        println!(
            " {} No security findings. Active workflows look clean!",
            "OK".green().bold()
        );
        println!();
    } else {
        for finding in &report.findings {
            print_finding(finding);
            println!();
        }
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    let stats = &report.stats;
    println!(" {}", "Summary".bold().underline());
    println!(
        " {} Findings: {} critical, {} high, {} medium, {} low",
        "|-".dimmed(),
        count_colored(report.critical_count(), Severity::Critical),
        count_colored(report.high_count(), Severity::High),
        stats.medium_findings,
        stats.low_findings,
    );
    for (finding_type, count) in &stats.findings_by_type {
        println!("    {} {}: {}", "-".dimmed(), finding_type.label(), count);
    }
    println!();
}

fn print_finding(finding: &SecurityFinding) {
    let severity_tag = match finding.severity {
        Severity::Critical => format!(" {} ", finding.severity.symbol())
            .on_red()
            .white()
            .bold()
            .to_string(),
        Severity::High => format!(" {} ", finding.severity.symbol())
            .on_yellow()
            .black()
            .bold()
            .to_string(),
        Severity::Medium => format!(" {} ", finding.severity.symbol())
            .on_blue()
            .white()
            .bold()
            .to_string(),
        Severity::Low => format!(" {} ", finding.severity.symbol())
            .dimmed()
            .to_string(),
    };

    println!(" {} {}", severity_tag, finding.title.bold());
    println!("   {} {}", "|".dimmed(), finding.description);

    if let Some(workflow) = &finding.workflow_name {
        println!("   {} Workflow: {}", "|".dimmed(), workflow.cyan());
    }
    if let Some(credential) = &finding.credential_id {
        println!("   {} Credential: {}", "|".dimmed(), credential.cyan());
    }
    if let Some(suggestion) = &finding.suggestion {
        println!("   {} {}", "|".dimmed(), suggestion.dimmed());
    }
    println!("   {} {}", "|".dimmed(), finding.id.dimmed());
}

/// Print workflows of a scan with their derived status.
pub fn print_workflows(report: &ScanReport) {
    println!();
    println!(
        "{}",
        format!(" Workflows on {}", report.instance_name).bold()
    );
    println!();

    if report.workflows.is_empty() {
        println!(" {}", "No workflows found.".dimmed());
        println!();
        return;
    }

    for wf in &report.workflows {
        let status = match wf.status {
            WorkflowStatus::Active => wf.status.label().green().bold(),
            WorkflowStatus::Inactive => wf.status.label().yellow(),
            WorkflowStatus::Archived => wf.status.label().dimmed(),
        };
        let tags = if wf.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", wf.tags.join(", ")).dimmed().to_string()
        };
        println!(
            " {:<9} {} {} ({} nodes){}",
            status,
            wf.id.dimmed(),
            wf.name,
            wf.node_count,
            tags
        );
    }
    println!();

    if !report.credentials.is_empty() {
        println!(" {}", "Credentials".bold().underline());
        for cred in &report.credentials {
            let source = match cred.source {
                CredentialSource::Remote => "remote".normal(),
                CredentialSource::Inferred => "inferred".yellow(),
            };
            println!(
                " {} {} ({}, {}) used by {} workflow(s)",
                "|-".dimmed(),
                cred.name,
                cred.credential_type.dimmed(),
                source,
                cred.used_by
            );
        }
        println!();
    }
}

/// Print the cross-instance report.
pub fn print_fleet_report(report: &FleetReport) {
    println!();
    println!(
        "{}",
        format!(
            " FlowLedger v{} — {} instance(s)",
            env!("CARGO_PKG_VERSION"),
            report.instance_stats.total
        )
        .bold()
    );
    println!();

    for summary in &report.instances {
        match summary.status {
            InstanceScanStatus::Ok => println!(
                " {} {} ({}) {} workflows, {} findings, {} critical",
                "OK".green().bold(),
                summary.instance_name.bold(),
                environment_tag(summary.environment),
                summary.workflows.total,
                summary.findings,
                count_colored(summary.critical_findings, Severity::Critical),
            ),
            InstanceScanStatus::Failed => {
                let kind = summary
                    .error_kind
                    .map(|k| k.label().to_string())
                    .unwrap_or_default();
                println!(
                    " {} {} ({}) {} error: {}",
                    "FAILED".red().bold(),
                    summary.instance_name.bold(),
                    environment_tag(summary.environment),
                    kind,
                    summary.error.as_deref().unwrap_or("unknown").dimmed()
                );
            }
        }
    }
    println!();
    println!(" {}", "=".repeat(60).dimmed());
    println!();

    let wf = &report.workflow_stats;
    let findings = &report.findings;
    println!(" {}", "Totals".bold().underline());
    println!(
        " {} Workflows: {} ({} active, {} inactive, {} archived)",
        "|-".dimmed(),
        wf.counts.total,
        wf.counts.active,
        wf.counts.inactive,
        wf.counts.archived
    );
    println!(
        " {} Instances with workflows: {}, average {:.1} per instance",
        "|-".dimmed(),
        wf.instances_with_workflows,
        wf.average_workflows_per_instance
    );
    println!(
        " {} Credentials: {} listed, {} referenced",
        "|-".dimmed(),
        report.credential_stats.total,
        report.credential_stats.unique_references
    );
    println!(
        " {} Findings: {} critical, {} high, {} medium, {} low",
        "|-".dimmed(),
        count_colored(findings.critical, Severity::Critical),
        count_colored(findings.high, Severity::High),
        findings.medium,
        findings.low
    );
    if report.has_failures() {
        println!(
            " {} {} instance(s) could not be scanned",
            "|-".dimmed(),
            report.failed_instances.to_string().red().bold()
        );
    }
    println!();
}

pub fn print_connection_check(url: &str, check: &ConnectionCheck) {
    println!();
    if check.connected {
        println!(" {} Connected to {}", "OK".green().bold(), url.cyan());
        match &check.version {
            Some(v) => println!("   {} n8n version {}", "|".dimmed(), v),
            None => println!("   {} {}", "|".dimmed(), "version could not be detected".dimmed()),
        }
    } else {
        println!(" {} {}", "FAILED".red().bold(), url.cyan());
        println!(
            "   {} {}",
            "|".dimmed(),
            check.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!();
}

pub fn print_version_status(instance: &Instance, current: Option<&str>, latest: Option<&str>) {
    println!();
    println!(" {}", instance.name.bold());
    println!(
        "   {} Running: {}",
        "|".dimmed(),
        current.unwrap_or("unknown")
    );
    println!("   {} Latest:  {}", "|".dimmed(), latest.unwrap_or("unknown"));
    if let (Some(current), Some(latest)) = (current, latest) {
        if flowledger_core::version::is_outdated(current, latest) {
            println!("   {} {}", "|".dimmed(), "Update available".yellow().bold());
        } else {
            println!("   {} {}", "|".dimmed(), "Up to date".green());
        }
    }
    println!();
}

pub fn print_alert(alert: &Alert) {
    println!("{} {}", "Subject:".bold(), alert.subject);
    println!();
    print!("{}", alert.text);
}
