//! Error types for remote access, payload normalization and scans.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The payload returned by an instance did not have the expected shape.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    UnexpectedShape { expected: &'static str, found: String },

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors raised while talking to an n8n instance.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Host unreachable, DNS failure, refused connection or timeout.
    #[error("cannot connect to n8n instance at {url}: {message}")]
    Connectivity { url: String, message: String },

    /// Request exceeded the per-call time budget.
    #[error("request to {url} timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },

    /// Invalid API key or insufficient permissions (401/403).
    #[error("invalid API key or insufficient permissions (status {status})")]
    Authentication { status: u16 },

    /// Endpoint not available on this instance (404).
    #[error("n8n instance not found or API endpoint not available: {path}")]
    NotFound { path: String },

    /// Any other non-success status.
    #[error("n8n API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] ParseError),

    #[error("failed to build HTTP client: {0}")]
    Setup(String),
}

/// Coarse classification surfaced to callers so they can react differently
/// (e.g. prompt for a new API key on `Authentication`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Authentication,
    NotFound,
    Api,
    MalformedData,
    Internal,
}

impl ErrorKind {
    pub fn label(&self) -> &str {
        match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Authentication => "authentication",
            ErrorKind::NotFound => "not found",
            ErrorKind::Api => "api",
            ErrorKind::MalformedData => "malformed data",
            ErrorKind::Internal => "internal",
        }
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connectivity { .. } | ClientError::Timeout { .. } => ErrorKind::Connectivity,
            ClientError::Authentication { .. } => ErrorKind::Authentication,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Api { .. } => ErrorKind::Api,
            ClientError::Decode(_) => ErrorKind::MalformedData,
            ClientError::Setup(_) => ErrorKind::Internal,
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, path: &str, body: &str) -> Self {
        match status {
            401 | 403 => ClientError::Authentication { status },
            404 => ClientError::NotFound {
                path: path.to_string(),
            },
            _ => ClientError::Api {
                status,
                message: summarize_body(body),
            },
        }
    }
}

fn summarize_body(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > 200 {
        let truncated: String = message.chars().take(200).collect();
        format!("{}...", truncated)
    } else {
        message
    }
}

/// Errors that abort a single instance's scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to fetch workflows from '{instance}': {source}")]
    WorkflowFetch {
        instance: String,
        #[source]
        source: ClientError,
    },

    #[error("invalid scan state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("scan task for '{instance}' did not complete: {message}")]
    Task { instance: String, message: String },
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::WorkflowFetch { source, .. } => source.kind(),
            ScanError::InvalidTransition { .. } | ScanError::Task { .. } => ErrorKind::Internal,
        }
    }
}

/// Errors loading `flowledger.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("instance '{instance}' has no API key (set api_key or api_key_env)")]
    MissingApiKey { instance: String },

    #[error("instance '{instance}' reads its API key from ${var}, which is not set")]
    MissingEnvVar { instance: String, var: String },

    #[error("duplicate instance id '{0}'")]
    DuplicateInstance(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_distinguishes_auth_from_not_found() {
        assert_eq!(
            ClientError::from_status(401, "/workflows", "").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            ClientError::from_status(403, "/workflows", "").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            ClientError::from_status(404, "/credentials", "").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ClientError::from_status(500, "/workflows", "boom").kind(),
            ErrorKind::Api
        );
    }

    #[test]
    fn api_error_prefers_json_message() {
        let err = ClientError::from_status(400, "/workflows", r#"{"message":"limit too large"}"#);
        assert_eq!(err.to_string(), "n8n API error (status 400): limit too large");
    }

    #[test]
    fn timeout_counts_as_connectivity() {
        let err = ClientError::Timeout {
            url: "https://n8n.local/api/v1/workflows".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn scan_error_keeps_client_kind() {
        let err = ScanError::WorkflowFetch {
            instance: "prod".into(),
            source: ClientError::Authentication { status: 401 },
        };
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
