use crate::parser::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name prefix that marks a workflow as tracked.
pub const TRACKED_PREFIX: char = '(';

/// Lifecycle status derived from the naming convention and the active flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Inactive,
    Archived,
}

impl WorkflowStatus {
    pub fn label(&self) -> &str {
        match self {
            WorkflowStatus::Active => "active",
            WorkflowStatus::Inactive => "inactive",
            WorkflowStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a workflow. Only names starting with `(` are tracked; everything
/// else is archived whatever its active flag says.
pub fn classify(workflow: &Workflow) -> WorkflowStatus {
    status_for(&workflow.name, workflow.is_active)
}

pub fn status_for(name: &str, is_active: bool) -> WorkflowStatus {
    if !name.starts_with(TRACKED_PREFIX) {
        WorkflowStatus::Archived
    } else if is_active {
        WorkflowStatus::Active
    } else {
        WorkflowStatus::Inactive
    }
}

/// Workflows grouped by lifecycle status, preserving input order.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub active: Vec<&'a Workflow>,
    pub inactive: Vec<&'a Workflow>,
    pub archived: Vec<&'a Workflow>,
}

impl Partition<'_> {
    pub fn total(&self) -> usize {
        self.active.len() + self.inactive.len() + self.archived.len()
    }
}

pub fn partition(workflows: &[Workflow]) -> Partition<'_> {
    let mut out = Partition::default();
    for workflow in workflows {
        match classify(workflow) {
            WorkflowStatus::Active => out.active.push(workflow),
            WorkflowStatus::Inactive => out.inactive.push(workflow),
            WorkflowStatus::Archived => out.archived.push(workflow),
        }
    }
    out
}
