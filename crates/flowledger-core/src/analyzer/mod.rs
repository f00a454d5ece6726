pub mod report;

use crate::classifier::{self, WorkflowStatus};
use crate::instance::Instance;
use crate::parser::credential::{Credential, CredentialSource};
use crate::parser::workflow::Workflow;
use crate::security::{self, credential_usage};
use chrono::{DateTime, Utc};
use report::{
    CredentialSummary, ScanReport, ScanStats, SecurityFinding, WorkflowCounts, WorkflowSummary,
};
use std::collections::BTreeSet;

/// Findings and reconciled credentials of one snapshot, before aggregation.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub findings: Vec<SecurityFinding>,
    pub credentials: Vec<Credential>,
    pub credentials_available: bool,
    pub total_credentials: usize,
}

/// Analyze an already-fetched snapshot of one instance.
///
/// `credentials` is `None` when the credentials endpoint could not be read.
/// The result depends only on the inputs, so the same snapshot and timestamp
/// always produce the same report.
pub fn analyze_snapshot(
    instance: &Instance,
    workflows: &[Workflow],
    credentials: Option<Vec<Credential>>,
    scanned_at: DateTime<Utc>,
) -> ScanReport {
    let analysis = analyze(instance, workflows, credentials, scanned_at);
    aggregate(instance, workflows, analysis, scanned_at)
}

/// Run the detectors over the active workflows and reconcile credentials.
///
/// Findings come back stamped with `scanned_at` and sorted by severity, then id.
pub fn analyze(
    instance: &Instance,
    workflows: &[Workflow],
    credentials: Option<Vec<Credential>>,
    scanned_at: DateTime<Utc>,
) -> Analysis {
    let partition = classifier::partition(workflows);
    let credentials_available = credentials.is_some();
    let remote = credentials.unwrap_or_default();
    let total_credentials = remote.len();

    let mut findings = Vec::new();
    for workflow in &partition.active {
        findings.extend(security::scan_workflow(workflow));
    }

    let reconciled = credential_usage::reconcile_credentials(remote, &partition.active, &instance.id);
    findings.extend(credential_usage::detect_credential_usage(&reconciled, &partition.active));

    for finding in &mut findings {
        if finding.instance_id.is_empty() {
            finding.instance_id = instance.id.clone();
        }
        finding.stamp(scanned_at);
    }
    findings.sort_by(|a, b| {
        b.severity
            .priority()
            .cmp(&a.severity.priority())
            .then_with(|| a.id.cmp(&b.id))
    });

    Analysis {
        findings,
        credentials: reconciled,
        credentials_available,
        total_credentials,
    }
}

/// Build stats and summaries from an analysis of the same workflows.
pub fn aggregate(
    instance: &Instance,
    workflows: &[Workflow],
    analysis: Analysis,
    scanned_at: DateTime<Utc>,
) -> ScanReport {
    let partition = classifier::partition(workflows);

    let unique_references: BTreeSet<&str> = partition
        .active
        .iter()
        .flat_map(|wf| wf.credential_references())
        .collect();

    let mut stats = ScanStats {
        workflows: WorkflowCounts {
            total: partition.total(),
            active: partition.active.len(),
            inactive: partition.inactive.len(),
            archived: partition.archived.len(),
        },
        total_credentials: analysis.total_credentials,
        unique_credential_references: unique_references.len(),
        ..ScanStats::default()
    };
    stats.count_findings(&analysis.findings);

    let workflow_summaries = workflows
        .iter()
        .map(|wf| WorkflowSummary {
            id: wf.id.clone(),
            name: wf.name.clone(),
            is_active: wf.is_active,
            status: classifier::classify(wf),
            node_count: wf.node_count(),
            tags: wf.tags.clone(),
        })
        .collect();

    let credential_summaries = analysis
        .credentials
        .iter()
        .map(|c| CredentialSummary {
            id: c.id.clone(),
            name: c.name.clone(),
            credential_type: c.credential_type.clone(),
            source: c.source,
            used_by: c.used_by.len(),
        })
        .collect();

    ScanReport {
        instance_id: instance.id.clone(),
        instance_name: instance.name.clone(),
        scanned_at,
        credentials_available: analysis.credentials_available,
        stats,
        findings: analysis.findings,
        workflows: workflow_summaries,
        credentials: credential_summaries,
    }
}

/// Whether a report contains any workflow of the given status.
pub fn has_status(report: &ScanReport, status: WorkflowStatus) -> bool {
    report.workflows.iter().any(|w| w.status == status)
}

/// Credentials the report could only infer from node references.
pub fn inferred_credentials(report: &ScanReport) -> impl Iterator<Item = &CredentialSummary> {
    report
        .credentials
        .iter()
        .filter(|c| c.source == CredentialSource::Inferred)
}
