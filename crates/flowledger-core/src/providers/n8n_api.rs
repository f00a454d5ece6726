use crate::error::{ClientError, ErrorKind};
use crate::instance::Instance;
use crate::parser::credential::Credential;
use crate::parser::n8n::N8nParser;
use crate::parser::workflow::Workflow;
use crate::providers::WorkflowSource;
use crate::version;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const API_PATH: &str = "/api/v1";
pub const API_KEY_HEADER: &str = "X-N8N-API-KEY";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const PAGE_LIMIT: usize = 250;
const NPM_REGISTRY_URL: &str = "https://registry.npmjs.org/n8n/latest";

/// Outcome of probing an instance with its API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Deserialize)]
struct NpmPackage {
    version: String,
}

/// Client for the n8n public REST API.
pub struct N8nClient {
    client: reqwest::Client,
    timeout: Duration,
    registry_url: String,
}

impl N8nClient {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            registry_url: NPM_REGISTRY_URL.to_string(),
        })
    }

    /// Point `fetch_latest_version` at a different package registry.
    pub fn with_registry_url(mut self, url: &str) -> Self {
        self.registry_url = url.to_string();
        self
    }

    fn api_url(instance: &Instance, path: &str) -> String {
        format!("{}{}{}", instance.base_url(), API_PATH, path)
    }

    fn map_transport_error(&self, url: &str, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else {
            ClientError::Connectivity {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        path: &str,
    ) -> Result<String, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(url, e))?;

        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), path, &body));
        }
        Ok(body)
    }

    /// GET an API path with the instance's key and decode the JSON body.
    async fn get_api(
        &self,
        instance: &Instance,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ClientError> {
        let url = Self::api_url(instance, path);
        let key = HeaderValue::from_str(&instance.api_key)
            .map_err(|_| ClientError::Setup("API key contains invalid header characters".into()))?;

        let request = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, key)
            .header(ACCEPT, "application/json")
            .query(query);

        let body = self.send(request, &url, path).await?;
        let value = serde_json::from_str(&body).map_err(crate::error::ParseError::from)?;
        Ok(value)
    }

    /// Follow `nextCursor` until the listing is exhausted.
    async fn get_all_pages(&self, instance: &Instance, path: &str) -> Result<Vec<Value>, ClientError> {
        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page = self.get_api(instance, path, &query).await?;
            let next = N8nParser::next_cursor(&page);
            pages.push(page);

            match next {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!(instance = %instance.id, path, cursor = %next, "pagination cursor repeated, stopping");
                    break;
                }
                None => break,
            }
        }

        debug!(instance = %instance.id, path, pages = pages.len(), "fetched listing");
        Ok(pages)
    }

    #[instrument(skip(self, instance), fields(instance = %instance.id))]
    pub async fn fetch_workflows(&self, instance: &Instance) -> Result<Vec<Workflow>, ClientError> {
        let mut workflows = Vec::new();
        for page in self.get_all_pages(instance, "/workflows").await? {
            workflows.extend(N8nParser::parse_workflows(&page, &instance.id)?);
        }
        Ok(workflows)
    }

    #[instrument(skip(self, instance), fields(instance = %instance.id))]
    pub async fn fetch_credentials(&self, instance: &Instance) -> Result<Vec<Credential>, ClientError> {
        let mut credentials = Vec::new();
        for page in self.get_all_pages(instance, "/credentials").await? {
            credentials.extend(N8nParser::parse_credentials(&page, &instance.id)?);
        }
        Ok(credentials)
    }

    /// Probe the workflows endpoint with `limit=1`. On success the version is
    /// detected as well.
    #[instrument(skip(self, instance), fields(instance = %instance.id))]
    pub async fn test_connection(&self, instance: &Instance) -> ConnectionCheck {
        match self
            .get_api(instance, "/workflows", &[("limit", "1".to_string())])
            .await
        {
            Ok(_) => ConnectionCheck {
                connected: true,
                version: self.detect_version(instance).await,
                error: None,
                error_kind: None,
            },
            Err(err) => ConnectionCheck {
                connected: false,
                version: None,
                error: Some(connection_message(&err)),
                error_kind: Some(err.kind()),
            },
        }
    }

    /// Try the settings endpoint, then `/healthz`, then the editor page.
    #[instrument(skip(self, instance), fields(instance = %instance.id))]
    pub async fn detect_version(&self, instance: &Instance) -> Option<String> {
        match self.get_api(instance, "/settings", &[]).await {
            Ok(settings) => {
                let found = settings
                    .get("data")
                    .unwrap_or(&settings)
                    .get("versionCli")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                if found.is_some() {
                    return found;
                }
            }
            Err(err) => debug!(error = %err, "settings endpoint unavailable"),
        }

        let health_url = format!("{}/healthz", instance.base_url());
        match self.client.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(body) = resp.json::<Value>().await {
                    if let Some(v) = body.get("version").and_then(|v| v.as_str()) {
                        return Some(v.to_string());
                    }
                }
            }
            Ok(resp) => debug!(status = resp.status().as_u16(), "healthz returned no version"),
            Err(err) => debug!(error = %err, "healthz unavailable"),
        }

        match self.client.get(instance.base_url()).send().await {
            Ok(resp) if resp.status().is_success() => {
                let html = resp.text().await.ok()?;
                version::parse_version_from_html(&html)
            }
            _ => None,
        }
    }

    /// Latest n8n release published to the npm registry.
    pub async fn fetch_latest_version(&self) -> Result<String, ClientError> {
        let url = self.registry_url.clone();
        let request = self
            .client
            .get(&url)
            .header(USER_AGENT, concat!("flowledger/", env!("CARGO_PKG_VERSION")));
        let body = self.send(request, &url, "/n8n/latest").await?;
        let package: NpmPackage =
            serde_json::from_str(&body).map_err(crate::error::ParseError::from)?;
        Ok(package.version)
    }
}

/// Message shown to a user whose connection test failed.
pub fn connection_message(err: &ClientError) -> String {
    match err {
        ClientError::Authentication { .. } => "Invalid API key".to_string(),
        ClientError::NotFound { .. } => {
            "n8n instance not found or API endpoint not available".to_string()
        }
        ClientError::Connectivity { .. } | ClientError::Timeout { .. } => {
            "Cannot connect to n8n instance. Please check the URL".to_string()
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl WorkflowSource for N8nClient {
    async fn list_workflows(&self, instance: &Instance) -> Result<Vec<Workflow>, ClientError> {
        self.fetch_workflows(instance).await
    }

    async fn list_credentials(&self, instance: &Instance) -> Result<Vec<Credential>, ClientError> {
        self.fetch_credentials(instance).await
    }
}
