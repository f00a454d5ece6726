//! Rendering of notification messages. Delivery is left to the caller.

use crate::analyzer::report::{ScanReport, SecurityFinding, Severity};
use serde::Serialize;
use std::fmt::Write;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#dc2626",
        Severity::High => "#ea580c",
        Severity::Medium => "#ca8a04",
        Severity::Low => "#2563eb",
    }
}

/// Alert listing the unresolved findings of a scan.
///
/// The subject carries the critical count; the body lists every unresolved
/// finding with its severity, followed by per-severity totals.
pub fn security_alert(instance_name: &str, findings: &[SecurityFinding]) -> Alert {
    let open: Vec<&SecurityFinding> = findings.iter().filter(|f| !f.is_resolved).collect();
    let count = |severity: Severity| open.iter().filter(|f| f.severity == severity).count();
    let (critical, high, medium, low) = (
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low),
    );

    let subject = format!(
        "Security Alert: {} critical findings in {}",
        critical, instance_name
    );
    let summary = format!(
        "Critical: {}, High: {}, Medium: {}, Low: {}",
        critical, high, medium, low
    );

    let mut text = format!(
        "{} security findings were detected in {}.\n{}\n\n",
        open.len(),
        instance_name,
        summary
    );
    let mut items = String::new();
    for finding in &open {
        let label = finding.severity.symbol();
        let _ = writeln!(text, "[{}] {}: {}", label, finding.title, finding.description);
        if let Some(workflow) = &finding.workflow_name {
            let _ = writeln!(text, "  Workflow: {}", workflow);
        }
        if let Some(suggestion) = &finding.suggestion {
            let _ = writeln!(text, "  Suggestion: {}", suggestion);
        }

        let _ = write!(
            items,
            "<li style=\"border-left:4px solid {};padding-left:8px;margin-bottom:8px\"><strong>[{}] {}</strong><br>{}",
            severity_color(finding.severity),
            label,
            escape_html(&finding.title),
            escape_html(&finding.description)
        );
        if let Some(workflow) = &finding.workflow_name {
            let _ = write!(items, "<br><em>Workflow: {}</em>", escape_html(workflow));
        }
        items.push_str("</li>");
    }
    text.push_str("\nReview these findings and remediate them as soon as possible.\n");

    let html = format!(
        "<h2>Security Alert</h2><p>{} security findings were detected in <strong>{}</strong>.</p><p>{}</p><ul>{}</ul>",
        open.len(),
        escape_html(instance_name),
        summary,
        items
    );

    Alert { subject, text, html }
}

/// Summary sent when a scan finishes.
pub fn scan_completion(instance_name: &str, report: &ScanReport) -> Alert {
    let stats = &report.stats;
    let subject = format!(
        "Scan Complete: {} findings in {}",
        stats.active_findings, instance_name
    );

    let rows = [
        ("Workflows", stats.workflows.total),
        ("Active workflows", stats.workflows.active),
        ("Critical", stats.critical_findings),
        ("High", stats.high_findings),
        ("Medium", stats.medium_findings),
        ("Low", stats.low_findings),
    ];

    let mut text = format!("Security scan of {} completed.\n\n", instance_name);
    let mut table = String::new();
    for (label, value) in rows {
        let _ = writeln!(text, "{}: {}", label, value);
        let _ = write!(table, "<tr><td>{}</td><td>{}</td></tr>", label, value);
    }
    if !report.credentials_available {
        text.push_str("\nCredentials could not be listed; credential checks used workflow references only.\n");
    }

    let html = format!(
        "<h2>Scan Complete</h2><p>Security scan of <strong>{}</strong> completed.</p><table>{}</table>",
        escape_html(instance_name),
        table
    );

    Alert { subject, text, html }
}
