use crate::classifier::WorkflowStatus;
use crate::parser::credential::CredentialSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Severity level for security findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Kind of security smell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Plaintext,
    SharedKey,
    Deprecated,
    Unused,
    WeakAuth,
}

impl FindingType {
    pub fn key(&self) -> &str {
        match self {
            FindingType::Plaintext => "plaintext",
            FindingType::SharedKey => "shared_key",
            FindingType::Deprecated => "deprecated",
            FindingType::Unused => "unused",
            FindingType::WeakAuth => "weak_auth",
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FindingType::Plaintext => "Plaintext Credential",
            FindingType::SharedKey => "Shared Credential",
            FindingType::Deprecated => "Deprecated Node",
            FindingType::Unused => "Unused Credential",
            FindingType::WeakAuth => "Weak Authentication",
        }
    }
}

/// A detected security concern. Derived on every scan, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    pub id: String,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    pub is_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityFinding {
    /// Unresolved finding with the given identity. Timestamps default to now;
    /// the scanner overwrites them with the scan timestamp.
    pub fn new(
        id: String,
        finding_type: FindingType,
        severity: Severity,
        title: &str,
        description: String,
        instance_id: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            finding_type,
            severity,
            title: title.to_string(),
            description,
            instance_id: instance_id.to_string(),
            workflow_id: None,
            workflow_name: None,
            node_id: None,
            credential_id: None,
            is_resolved: false,
            suggestion: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stamp(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
        self.updated_at = at;
    }
}

/// Workflow counts by lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub archived: usize,
}

impl WorkflowCounts {
    pub fn add(&mut self, other: &WorkflowCounts) {
        self.total += other.total;
        self.active += other.active;
        self.inactive += other.inactive;
        self.archived += other.archived;
    }
}

/// Summary statistics of one instance scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub workflows: WorkflowCounts,
    /// Credentials listed by the remote credentials endpoint.
    pub total_credentials: usize,
    /// Distinct credential references found in active workflow nodes.
    pub unique_credential_references: usize,
    pub active_findings: usize,
    pub critical_findings: usize,
    pub high_findings: usize,
    pub medium_findings: usize,
    pub low_findings: usize,
    pub findings_by_type: BTreeMap<FindingType, usize>,
}

impl ScanStats {
    pub fn count_findings(&mut self, findings: &[SecurityFinding]) {
        for finding in findings.iter().filter(|f| !f.is_resolved) {
            self.active_findings += 1;
            match finding.severity {
                Severity::Critical => self.critical_findings += 1,
                Severity::High => self.high_findings += 1,
                Severity::Medium => self.medium_findings += 1,
                Severity::Low => self.low_findings += 1,
            }
            *self.findings_by_type.entry(finding.finding_type).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub status: WorkflowStatus,
    pub node_count: usize,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub source: CredentialSource,
    pub used_by: usize,
}

/// The complete result of scanning one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub instance_id: String,
    pub instance_name: String,
    pub scanned_at: DateTime<Utc>,
    /// False when the credentials endpoint was unavailable and the scan ran without it.
    pub credentials_available: bool,
    pub stats: ScanStats,
    pub findings: Vec<SecurityFinding>,
    pub workflows: Vec<WorkflowSummary>,
    pub credentials: Vec<CredentialSummary>,
}

impl ScanReport {
    pub fn critical_count(&self) -> usize {
        self.stats.critical_findings
    }

    pub fn high_count(&self) -> usize {
        self.stats.high_findings
    }

    pub fn findings_of(&self, finding_type: FindingType) -> impl Iterator<Item = &SecurityFinding> {
        self.findings.iter().filter(move |f| f.finding_type == finding_type)
    }
}
