use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk rating attached to a credential's metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Where a credential record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Listed by the instance's credentials endpoint.
    Remote,
    /// Only known through node references inside fetched workflows.
    Inferred,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

/// A named secret or auth configuration referenced by nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub n8n_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default)]
    pub instance_id: String,
    /// Workflow ids whose nodes reference this credential.
    #[serde(default)]
    pub used_by: Vec<String>,
    pub source: CredentialSource,
    #[serde(default)]
    pub metadata: CredentialMetadata,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(id: &str, name: &str, credential_type: &str) -> Self {
        Self {
            id: id.to_string(),
            n8n_id: id.to_string(),
            name: name.to_string(),
            credential_type: credential_type.to_string(),
            instance_id: String::new(),
            used_by: Vec::new(),
            source: CredentialSource::Remote,
            metadata: CredentialMetadata::default(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Credential known only from a node reference.
    pub fn inferred(reference: &str) -> Self {
        Self {
            source: CredentialSource::Inferred,
            ..Self::new(reference, reference, "unknown")
        }
    }

    /// Whether a node credential reference points at this credential.
    ///
    /// Matches the remote id, the local id, and finally the name. Name
    /// matching is best-effort: two credentials sharing a name both match.
    pub fn matches_reference(&self, reference: &str) -> bool {
        if reference.is_empty() {
            return false;
        }
        reference == self.n8n_id || reference == self.id || reference == self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_remote_id_local_id_or_name() {
        let mut cred = Credential::new("local-7", "Slack Bot", "slackApi");
        cred.n8n_id = "42".into();

        assert!(cred.matches_reference("42"));
        assert!(cred.matches_reference("local-7"));
        assert!(cred.matches_reference("Slack Bot"));
        assert!(!cred.matches_reference("slackApi"));
        assert!(!cred.matches_reference(""));
    }

    #[test]
    fn inferred_credential_is_named_by_reference() {
        let cred = Credential::inferred("Postgres Prod");
        assert_eq!(cred.source, CredentialSource::Inferred);
        assert_eq!(cred.name, "Postgres Prod");
        assert!(cred.matches_reference("Postgres Prod"));
    }
}
