use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment environment of a monitored n8n instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn label(&self) -> &str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn color_code(&self) -> &str {
        match self {
            Environment::Production => "red",
            Environment::Staging => "yellow",
            Environment::Development => "green",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A remotely hosted n8n server being monitored.
///
/// The scan engine only reads `url` and `api_key`; everything else is
/// carried through to reports.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub environment: Environment,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Instance {
    pub fn new(id: &str, name: &str, url: &str, api_key: &str, environment: Environment) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            api_key: api_key.to_string(),
            environment,
            is_active: true,
            version: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &"***")
            .field("environment", &self.environment)
            .field("is_active", &self.is_active)
            .field("version", &self.version)
            .finish()
    }
}
