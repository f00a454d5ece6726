use async_trait::async_trait;
use flowledger_core::error::{ClientError, ErrorKind, ScanError};
use flowledger_core::fleet::{self, InstanceScanStatus};
use flowledger_core::instance::{Environment, Instance};
use flowledger_core::parser::credential::{Credential, CredentialSource};
use flowledger_core::parser::n8n::N8nParser;
use flowledger_core::parser::workflow::{Node, Workflow};
use flowledger_core::providers::cache::CachedSource;
use flowledger_core::providers::WorkflowSource;
use flowledger_core::scanner::{scan_instance, scan_instance_at, ScanOptions};
use flowledger_core::{FindingType, Severity};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Get the workspace root (two levels up from CARGO_MANIFEST_DIR of flowledger-core).
fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir)
        .parent()
        .unwrap() // crates/
        .parent()
        .unwrap() // workspace root
        .join("tests/fixtures")
}

fn n8n_fixture(name: &str) -> Value {
    let path = fixtures_dir().join("n8n").join(name);
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
    serde_json::from_str(&content).unwrap()
}

fn instance(id: &str) -> Instance {
    Instance::new(id, id, "https://n8n.example.com", "test-key", Environment::Production)
}

#[derive(Clone, Copy)]
enum Failure {
    Auth,
    Unreachable,
    NotFound,
    Slow,
}

impl Failure {
    async fn into_error(self) -> ClientError {
        match self {
            Failure::Auth => ClientError::Authentication { status: 401 },
            Failure::Unreachable => ClientError::Connectivity {
                url: "https://n8n.example.com".into(),
                message: "connection refused".into(),
            },
            Failure::NotFound => ClientError::NotFound {
                path: "/credentials".into(),
            },
            Failure::Slow => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ClientError::Api {
                    status: 500,
                    message: "too late".into(),
                }
            }
        }
    }
}

/// Serves the fixture payloads through the real parser.
struct FixtureSource {
    workflows: Result<Value, Failure>,
    credentials: Result<Value, Failure>,
    calls: AtomicUsize,
}

impl FixtureSource {
    fn healthy() -> Self {
        Self {
            workflows: Ok(n8n_fixture("workflows.json")),
            credentials: Ok(n8n_fixture("credentials.json")),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WorkflowSource for FixtureSource {
    async fn list_workflows(&self, instance: &Instance) -> Result<Vec<Workflow>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.workflows {
            Ok(payload) => Ok(N8nParser::parse_workflows(payload, &instance.id)?),
            Err(failure) => Err(failure.into_error().await),
        }
    }

    async fn list_credentials(&self, instance: &Instance) -> Result<Vec<Credential>, ClientError> {
        match &self.credentials {
            Ok(payload) => Ok(N8nParser::parse_credentials(payload, &instance.id)?),
            Err(failure) => Err(failure.into_error().await),
        }
    }
}

/// In-memory workflows, routed per instance id for fleet tests.
struct MemorySource {
    workflows: Vec<Workflow>,
    credentials: Vec<Credential>,
    failing: Vec<(String, Failure)>,
}

#[async_trait]
impl WorkflowSource for MemorySource {
    async fn list_workflows(&self, instance: &Instance) -> Result<Vec<Workflow>, ClientError> {
        if let Some((_, failure)) = self.failing.iter().find(|(id, _)| id == &instance.id) {
            return Err(failure.into_error().await);
        }
        Ok(self.workflows.clone())
    }

    async fn list_credentials(&self, _instance: &Instance) -> Result<Vec<Credential>, ClientError> {
        Ok(self.credentials.clone())
    }
}

fn workflow_referencing(id: &str, reference: &str) -> Workflow {
    let mut wf = Workflow::new(id, &format!("(Sync) {id}"), true);
    let mut node = Node::new(&format!("{id}-n"), "Query", "n8n-nodes-base.postgres");
    node.credentials.push(reference.to_string());
    wf.nodes.push(node);
    wf
}

fn postgres_credential() -> Credential {
    Credential::new("pg-1", "Postgres Prod", "postgres")
}

// ─── Single-instance scans ───

#[tokio::test]
async fn test_fixture_scan_matches_expected_counts() {
    let source = FixtureSource::healthy();
    let report = scan_instance(&source, &instance("billing"), &ScanOptions::default())
        .await
        .unwrap();

    let stats = &report.stats;
    assert_eq!(stats.workflows.total, 3);
    assert_eq!(stats.workflows.active, 2);
    assert_eq!(stats.workflows.inactive, 0);
    assert_eq!(stats.workflows.archived, 1);
    assert_eq!(stats.total_credentials, 1);
    assert_eq!(stats.unique_credential_references, 1);

    assert_eq!(report.findings.len(), 1, "findings: {:#?}", report.findings);
    let finding = &report.findings[0];
    assert_eq!(finding.finding_type, FindingType::Plaintext);
    assert_eq!(finding.severity, Severity::High);
    assert_eq!(finding.id, "plaintext-1-a1f0c2e4-0002-password");
    assert_eq!(finding.instance_id, "billing");
    assert_eq!(finding.workflow_name.as_deref(), Some("(Billing) Invoice sync"));

    assert_eq!(stats.active_findings, 1);
    assert_eq!(stats.high_findings, 1);
    assert_eq!(report.credentials.len(), 1);
    assert_eq!(report.credentials[0].used_by, 2);
}

#[tokio::test]
async fn test_malformed_node_is_skipped_not_fatal() {
    let source = FixtureSource::healthy();
    let report = scan_instance(&source, &instance("billing"), &ScanOptions::default())
        .await
        .unwrap();

    let reminder = report.workflows.iter().find(|w| w.id == "2").unwrap();
    assert_eq!(reminder.node_count, 2);
    assert_eq!(reminder.tags, vec!["billing", "notifications"]);
}

#[tokio::test]
async fn test_credentials_failure_degrades_gracefully() {
    let source = FixtureSource {
        credentials: Err(Failure::NotFound),
        ..FixtureSource::healthy()
    };
    let report = scan_instance(&source, &instance("billing"), &ScanOptions::default())
        .await
        .unwrap();

    assert!(!report.credentials_available);
    assert_eq!(report.stats.total_credentials, 0);
    assert_eq!(report.findings_of(FindingType::Plaintext).count(), 1);

    // The reference shared by both active workflows is still tracked.
    assert_eq!(report.credentials.len(), 1);
    assert_eq!(report.credentials[0].source, CredentialSource::Inferred);
    assert_eq!(report.credentials[0].used_by, 2);
}

#[tokio::test]
async fn test_repeated_scans_are_idempotent() {
    let source = FixtureSource::healthy();
    let options = ScanOptions::default();
    let first = scan_instance(&source, &instance("billing"), &options).await.unwrap();
    let second = scan_instance(&source, &instance("billing"), &options).await.unwrap();

    let key = |r: &flowledger_core::ScanReport| {
        r.findings
            .iter()
            .map(|f| (f.id.clone(), f.finding_type, f.severity))
            .collect::<BTreeSet<_>>()
    };
    assert_eq!(key(&first), key(&second));
    assert_eq!(first.stats, second.stats);
}

#[tokio::test]
async fn test_fixed_timestamp_gives_identical_reports() {
    let source = FixtureSource::healthy();
    let at = chrono::Utc::now();
    let options = ScanOptions::default();
    let a = scan_instance_at(&source, &instance("billing"), &options, at).await.unwrap();
    let b = scan_instance_at(&source, &instance("billing"), &options, at).await.unwrap();
    assert_eq!(
        serde_json::to_value(&a).unwrap(),
        serde_json::to_value(&b).unwrap()
    );
}

#[tokio::test]
async fn test_shared_credential_threshold() {
    for (count, expected) in [
        (4, Some(FindingType::SharedKey)),
        (3, None),
        (0, Some(FindingType::Unused)),
    ] {
        let mut workflows: Vec<Workflow> = (0..count)
            .map(|i| workflow_referencing(&format!("wf-{i}"), "pg-1"))
            .collect();
        workflows.push(workflow_referencing("other", "mysql-9"));

        let source = MemorySource {
            workflows,
            credentials: vec![postgres_credential()],
            failing: Vec::new(),
        };
        let report = scan_instance(&source, &instance("db"), &ScanOptions::default())
            .await
            .unwrap();

        let types: Vec<FindingType> = report
            .findings
            .iter()
            .filter(|f| f.credential_id.as_deref() == Some("pg-1"))
            .map(|f| f.finding_type)
            .collect();
        assert_eq!(types, expected.into_iter().collect::<Vec<_>>(), "usage {count}");
    }
}

#[tokio::test]
async fn test_inactive_workflows_do_not_count_as_usage() {
    let mut workflows: Vec<Workflow> = (0..5)
        .map(|i| workflow_referencing(&format!("wf-{i}"), "pg-1"))
        .collect();
    for wf in workflows.iter_mut().skip(2) {
        wf.is_active = false;
    }
    let source = MemorySource {
        workflows,
        credentials: vec![postgres_credential()],
        failing: Vec::new(),
    };
    let report = scan_instance(&source, &instance("db"), &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.stats.workflows.inactive, 3);
    assert_eq!(report.findings_of(FindingType::SharedKey).count(), 0);
}

#[tokio::test]
async fn test_auth_and_connectivity_errors_are_distinguished() {
    for (failure, kind) in [
        (Failure::Auth, ErrorKind::Authentication),
        (Failure::Unreachable, ErrorKind::Connectivity),
    ] {
        let source = FixtureSource {
            workflows: Err(failure),
            ..FixtureSource::healthy()
        };
        let err = scan_instance(&source, &instance("x"), &ScanOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::WorkflowFetch { .. }));
        assert_eq!(err.kind(), kind);
    }
}

#[tokio::test]
async fn test_slow_workflow_fetch_times_out() {
    let source = FixtureSource {
        workflows: Err(Failure::Slow),
        ..FixtureSource::healthy()
    };
    let options = ScanOptions {
        timeout: Duration::from_millis(50),
        max_pages: 1,
    };
    let err = scan_instance(&source, &instance("slow"), &options).await.unwrap_err();
    match err {
        ScanError::WorkflowFetch { source, .. } => {
            assert!(matches!(source, ClientError::Timeout { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_slow_credentials_fetch_still_completes() {
    let source = FixtureSource {
        credentials: Err(Failure::Slow),
        ..FixtureSource::healthy()
    };
    let options = ScanOptions {
        timeout: Duration::from_millis(50),
        max_pages: 1,
    };
    let report = scan_instance(&source, &instance("slow"), &options).await.unwrap();
    assert!(!report.credentials_available);
    assert_eq!(report.stats.workflows.total, 3);
}

/// Serves workflows as a listing of `pages` pages that each take `per_page`.
struct PagedSource {
    pages: u32,
    per_page: Duration,
}

#[async_trait]
impl WorkflowSource for PagedSource {
    async fn list_workflows(&self, _instance: &Instance) -> Result<Vec<Workflow>, ClientError> {
        let mut workflows = Vec::new();
        for page in 0..self.pages {
            tokio::time::sleep(self.per_page).await;
            workflows.push(Workflow::new(&page.to_string(), &format!("(Page) {page}"), true));
        }
        Ok(workflows)
    }

    async fn list_credentials(&self, _instance: &Instance) -> Result<Vec<Credential>, ClientError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_paginated_listing_is_budgeted_per_page() {
    let source = PagedSource {
        pages: 3,
        per_page: Duration::from_millis(60),
    };
    let options = ScanOptions {
        timeout: Duration::from_millis(100),
        max_pages: 5,
    };
    let report = scan_instance(&source, &instance("large"), &options).await.unwrap();
    assert_eq!(report.stats.workflows.total, 3);

    let one_page = ScanOptions {
        max_pages: 1,
        ..options
    };
    let err = scan_instance(&source, &instance("large"), &one_page)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
}

#[tokio::test]
async fn test_cached_source_reuses_fetches() {
    let cache = CachedSource::new(FixtureSource::healthy(), Duration::from_secs(30));
    let options = ScanOptions::default();
    scan_instance(&cache, &instance("billing"), &options).await.unwrap();
    scan_instance(&cache, &instance("billing"), &options).await.unwrap();
    assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);

    cache.invalidate_instance("billing");
    scan_instance(&cache, &instance("billing"), &options).await.unwrap();
    assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
}

// ─── Fleet scans ───

#[tokio::test]
async fn test_fleet_isolates_failing_instances() {
    let source: Arc<dyn WorkflowSource> = Arc::new(MemorySource {
        workflows: (0..4)
            .map(|i| workflow_referencing(&format!("wf-{i}"), "pg-1"))
            .collect(),
        credentials: vec![postgres_credential()],
        failing: vec![
            ("locked".to_string(), Failure::Auth),
            ("down".to_string(), Failure::Unreachable),
        ],
    });

    let mut staging = instance("staging");
    staging.environment = Environment::Staging;
    let instances = vec![instance("prod"), instance("locked"), staging, instance("down")];

    let outcomes = fleet::scan_all(source, instances, ScanOptions::default(), 2).await;
    assert_eq!(outcomes.len(), 4);
    let ids: Vec<&str> = outcomes.iter().map(|o| o.instance.id.as_str()).collect();
    assert_eq!(ids, vec!["prod", "locked", "staging", "down"]);
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[2].result.is_ok());

    let report = fleet::aggregate(&outcomes);
    assert_eq!(report.failed_instances, 2);
    assert_eq!(report.instance_stats.total, 4);
    assert_eq!(report.workflow_stats.counts.total, 8);
    assert_eq!(report.workflow_stats.average_workflows_per_instance, 4.0);
    assert_eq!(report.findings.by_type.get(&FindingType::SharedKey), Some(&2));
    assert_eq!(report.instances[1].status, InstanceScanStatus::Failed);
    assert_eq!(report.instances[1].error_kind, Some(ErrorKind::Authentication));
    assert_eq!(report.instances[3].error_kind, Some(ErrorKind::Connectivity));
}

#[tokio::test]
async fn test_fleet_report_serializes_camel_case() {
    let source: Arc<dyn WorkflowSource> = Arc::new(FixtureSource::healthy());
    let outcomes = fleet::scan_all(source, vec![instance("billing")], ScanOptions::default(), 4).await;
    let json = serde_json::to_value(fleet::aggregate(&outcomes)).unwrap();

    assert_eq!(json["workflowStats"]["total"], 3);
    assert_eq!(json["workflowStats"]["instancesWithWorkflows"], 1);
    assert_eq!(json["instanceStats"]["byEnvironment"]["production"], 1);
    assert_eq!(json["findings"]["byType"]["plaintext"], 1);
}
