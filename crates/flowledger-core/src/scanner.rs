//! Single-instance scan orchestration.
//!
//! A scan moves through `idle -> fetching -> analyzing -> aggregating -> done`.
//! Any phase after `idle` may fall into `failed`, which is terminal.

use crate::analyzer::{self, report::ScanReport};
use crate::error::{ClientError, ScanError};
use crate::instance::Instance;
use crate::providers::{ResourceKind, WorkflowSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Idle,
    Fetching,
    Analyzing,
    Aggregating,
    Done,
    Failed,
}

impl ScanPhase {
    pub fn label(&self) -> &str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Fetching => "fetching",
            ScanPhase::Analyzing => "analyzing",
            ScanPhase::Aggregating => "aggregating",
            ScanPhase::Done => "done",
            ScanPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Done | ScanPhase::Failed)
    }

    pub fn can_transition_to(&self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Analyzing)
                | (Analyzing, Aggregating)
                | (Aggregating, Done)
                | (Fetching, Failed)
                | (Analyzing, Failed)
                | (Aggregating, Failed)
        )
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracks the phase of one scan and rejects out-of-order transitions.
#[derive(Debug, Clone)]
pub struct ScanRun {
    phase: ScanPhase,
    history: Vec<ScanPhase>,
}

impl Default for ScanRun {
    fn default() -> Self {
        Self {
            phase: ScanPhase::Idle,
            history: vec![ScanPhase::Idle],
        }
    }
}

impl ScanRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn history(&self) -> &[ScanPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: ScanPhase) -> Result<(), ScanError> {
        if !self.phase.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.phase, to = %next, "scan phase");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `failed` unless the run already finished.
    pub fn fail(&mut self) {
        if self.phase.can_transition_to(ScanPhase::Failed) {
            self.phase = ScanPhase::Failed;
            self.history.push(ScanPhase::Failed);
        }
    }
}

/// Default number of listing pages a single fetch is budgeted for.
pub const DEFAULT_MAX_PAGES: u32 = 40;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Budget for each remote request, i.e. one listing page.
    pub timeout: Duration,
    /// Pages a paginated listing may take before the whole fetch is abandoned.
    pub max_pages: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: crate::providers::n8n_api::DEFAULT_TIMEOUT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ScanOptions {
    /// Budget for one paginated listing: the per-page timeout times the page
    /// allowance. Individual pages are bounded by the client's own timeout.
    pub fn fetch_budget(&self) -> Duration {
        self.timeout.saturating_mul(self.max_pages.max(1))
    }
}

async fn bounded<T, F>(
    instance: &Instance,
    kind: ResourceKind,
    timeout: Duration,
    fetch: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            url: format!("{} ({})", instance.base_url(), kind),
            after: timeout,
        }),
    }
}

/// Fetch an instance's workflows and credentials and analyze them.
///
/// Workflow fetch failures abort the scan. Credential fetch failures are
/// logged and the scan continues without remote credentials.
#[instrument(skip(source, instance, options), fields(instance = %instance.id))]
pub async fn scan_instance(
    source: &dyn WorkflowSource,
    instance: &Instance,
    options: &ScanOptions,
) -> Result<ScanReport, ScanError> {
    scan_instance_at(source, instance, options, Utc::now()).await
}

/// Like [`scan_instance`] with an explicit scan timestamp.
pub async fn scan_instance_at(
    source: &dyn WorkflowSource,
    instance: &Instance,
    options: &ScanOptions,
    scanned_at: DateTime<Utc>,
) -> Result<ScanReport, ScanError> {
    let mut run = ScanRun::new();
    run.advance(ScanPhase::Fetching)?;

    let workflows = match bounded(
        instance,
        ResourceKind::Workflows,
        options.fetch_budget(),
        source.list_workflows(instance),
    )
    .await
    {
        Ok(workflows) => workflows,
        Err(err) => {
            run.fail();
            warn!(instance = %instance.id, kind = err.kind().label(), error = %err, "workflow fetch failed");
            return Err(ScanError::WorkflowFetch {
                instance: instance.id.clone(),
                source: err,
            });
        }
    };

    let credentials = match bounded(
        instance,
        ResourceKind::Credentials,
        options.fetch_budget(),
        source.list_credentials(instance),
    )
    .await
    {
        Ok(credentials) => Some(credentials),
        Err(err) => {
            warn!(
                instance = %instance.id,
                error = %err,
                "credentials unavailable, continuing without them"
            );
            None
        }
    };

    run.advance(ScanPhase::Analyzing)?;
    let analysis = analyzer::analyze(instance, &workflows, credentials, scanned_at);
    debug!(findings = analysis.findings.len(), "detectors finished");

    run.advance(ScanPhase::Aggregating)?;
    let report = analyzer::aggregate(instance, &workflows, analysis, scanned_at);
    run.advance(ScanPhase::Done)?;

    info!(
        instance = %instance.id,
        workflows = report.stats.workflows.total,
        findings = report.stats.active_findings,
        critical = report.stats.critical_findings,
        "scan complete"
    );
    Ok(report)
}
