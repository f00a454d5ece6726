//! Scanning many instances at once and merging their results.

use crate::analyzer::report::{FindingType, ScanReport, Severity, WorkflowCounts};
use crate::error::{ErrorKind, ScanError};
use crate::instance::{Environment, Instance};
use crate::providers::WorkflowSource;
use crate::scanner::{self, ScanOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

/// Result of scanning one instance in a fleet run.
#[derive(Debug)]
pub struct InstanceOutcome {
    pub instance: Instance,
    pub result: Result<ScanReport, ScanError>,
}

/// Scan every instance concurrently, at most `concurrency` at a time.
///
/// One instance failing, timing out or panicking never affects the others.
/// Outcomes are returned in the order of `instances`.
#[instrument(skip(source, instances, options), fields(instances = instances.len()))]
pub async fn scan_all(
    source: Arc<dyn WorkflowSource>,
    instances: Vec<Instance>,
    options: ScanOptions,
    concurrency: usize,
) -> Vec<InstanceOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, instance) in instances.iter().cloned().enumerate() {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let options = options.clone();
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => scanner::scan_instance(source.as_ref(), &instance, &options).await,
                Err(e) => Err(ScanError::Task {
                    instance: instance.id.clone(),
                    message: format!("semaphore closed: {}", e),
                }),
            };
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<ScanReport, ScanError>>> =
        instances.iter().map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!(error = %e, "scan task aborted"),
        }
    }

    let outcomes: Vec<InstanceOutcome> = instances
        .into_iter()
        .zip(results)
        .map(|(instance, result)| {
            let result = result.unwrap_or_else(|| {
                Err(ScanError::Task {
                    instance: instance.id.clone(),
                    message: "scan task panicked or was cancelled".to_string(),
                })
            });
            InstanceOutcome { instance, result }
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(total = outcomes.len(), failed, "fleet scan finished");
    outcomes
}

/// Per-instance line of a fleet report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub instance_id: String,
    pub instance_name: String,
    pub environment: Environment,
    pub status: InstanceScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub workflows: WorkflowCounts,
    pub findings: usize,
    pub critical_findings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceScanStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_environment: BTreeMap<Environment, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStats {
    #[serde(flatten)]
    pub counts: WorkflowCounts,
    pub instances_with_workflows: usize,
    pub average_workflows_per_instance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStats {
    /// Credentials listed by the instances' credentials endpoints.
    pub total: usize,
    /// Distinct credential references per instance, summed.
    pub unique_references: usize,
    pub instances_without_credential_access: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingTotals {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub by_type: BTreeMap<FindingType, usize>,
}

/// Cross-instance statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    pub instances: Vec<InstanceSummary>,
    pub instance_stats: InstanceStats,
    pub workflow_stats: WorkflowStats,
    pub credential_stats: CredentialStats,
    pub findings: FindingTotals,
    pub failed_instances: usize,
}

impl FleetReport {
    pub fn has_failures(&self) -> bool {
        self.failed_instances > 0
    }
}

/// Merge per-instance outcomes. Failed instances count toward instance stats
/// and appear with their error; their findings are absent.
pub fn aggregate(outcomes: &[InstanceOutcome]) -> FleetReport {
    let mut instance_stats = InstanceStats::default();
    let mut workflow_counts = WorkflowCounts::default();
    let mut instances_with_workflows = 0;
    let mut credential_stats = CredentialStats::default();
    let mut findings = FindingTotals::default();
    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut failed_instances = 0;
    let mut scanned = 0;

    for outcome in outcomes {
        let instance = &outcome.instance;
        instance_stats.total += 1;
        if instance.is_active {
            instance_stats.active += 1;
        } else {
            instance_stats.inactive += 1;
        }
        *instance_stats.by_environment.entry(instance.environment).or_insert(0) += 1;

        match &outcome.result {
            Ok(report) => {
                scanned += 1;
                let stats = &report.stats;
                workflow_counts.add(&stats.workflows);
                if stats.workflows.total > 0 {
                    instances_with_workflows += 1;
                }
                credential_stats.total += stats.total_credentials;
                credential_stats.unique_references += stats.unique_credential_references;
                if !report.credentials_available {
                    credential_stats.instances_without_credential_access += 1;
                }

                for finding in report.findings.iter().filter(|f| !f.is_resolved) {
                    findings.total += 1;
                    match finding.severity {
                        Severity::Critical => findings.critical += 1,
                        Severity::High => findings.high += 1,
                        Severity::Medium => findings.medium += 1,
                        Severity::Low => findings.low += 1,
                    }
                    *findings.by_type.entry(finding.finding_type).or_insert(0) += 1;
                }

                summaries.push(InstanceSummary {
                    instance_id: instance.id.clone(),
                    instance_name: instance.name.clone(),
                    environment: instance.environment,
                    status: InstanceScanStatus::Ok,
                    error_kind: None,
                    error: None,
                    workflows: stats.workflows,
                    findings: stats.active_findings,
                    critical_findings: stats.critical_findings,
                });
            }
            Err(err) => {
                failed_instances += 1;
                summaries.push(InstanceSummary {
                    instance_id: instance.id.clone(),
                    instance_name: instance.name.clone(),
                    environment: instance.environment,
                    status: InstanceScanStatus::Failed,
                    error_kind: Some(err.kind()),
                    error: Some(err.to_string()),
                    workflows: WorkflowCounts::default(),
                    findings: 0,
                    critical_findings: 0,
                });
            }
        }
    }

    let average_workflows_per_instance = if scanned == 0 {
        0.0
    } else {
        workflow_counts.total as f64 / scanned as f64
    };

    FleetReport {
        instances: summaries,
        instance_stats,
        workflow_stats: WorkflowStats {
            counts: workflow_counts,
            instances_with_workflows,
            average_workflows_per_instance,
        },
        credential_stats,
        findings,
        failed_instances,
    }
}
