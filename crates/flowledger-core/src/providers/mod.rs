pub mod cache;
pub mod n8n_api;

use crate::error::ClientError;
use crate::instance::Instance;
use crate::parser::credential::Credential;
use crate::parser::workflow::Workflow;
use async_trait::async_trait;
use std::fmt;

/// Remote resource families fetched from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Workflows,
    Credentials,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Workflows => f.write_str("workflows"),
            ResourceKind::Credentials => f.write_str("credentials"),
        }
    }
}

/// Supplies normalized workflows and credentials for an instance.
///
/// Implementations must return nodes whose `credentials` are flat reference
/// strings and whose `parameters` are JSON object maps.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    async fn list_workflows(&self, instance: &Instance) -> Result<Vec<Workflow>, ClientError>;

    /// Many instances do not expose this endpoint; callers treat failure as
    /// "no credentials available".
    async fn list_credentials(&self, instance: &Instance) -> Result<Vec<Credential>, ClientError>;
}
