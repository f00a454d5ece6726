use super::canonical::canonical_map_text;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Canvas position of a node in the n8n editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single step within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Flat list of credential references (remote id, else name, else type key).
    #[serde(default)]
    pub credentials: Vec<String>,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    pub fn new(id: &str, name: &str, node_type: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            node_type: node_type.to_string(),
            parameters: Map::new(),
            credentials: Vec::new(),
            position: Position::default(),
        }
    }

    /// Deterministic text form of the parameters used for pattern matching.
    pub fn parameters_text(&self) -> String {
        canonical_map_text(&self.parameters)
    }
}

/// An edge in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub from_output: String,
    pub to_input: String,
}

/// An automation definition hosted on an instance, in canonical shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub n8n_id: String,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instance_id: String,
}

impl Workflow {
    pub fn new(id: &str, name: &str, is_active: bool) -> Self {
        Self {
            id: id.to_string(),
            n8n_id: id.to_string(),
            name: name.to_string(),
            is_active,
            nodes: Vec::new(),
            connections: Vec::new(),
            tags: Vec::new(),
            owner: None,
            created_at: None,
            updated_at: None,
            instance_id: String::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All distinct credential references across this workflow's nodes.
    pub fn credential_references(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.credentials.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameters_text_is_key_sorted() {
        let mut node = Node::new("1", "HTTP", "n8n-nodes-base.httpRequestV2");
        node.parameters.insert("url".into(), json!("https://api.example.com"));
        node.parameters.insert("method".into(), json!("GET"));
        assert_eq!(
            node.parameters_text(),
            r#"{"method":"GET","url":"https://api.example.com"}"#
        );
    }

    #[test]
    fn empty_parameters_serialize_to_empty_object() {
        let node = Node::new("1", "Start", "n8n-nodes-base.manualTrigger");
        assert_eq!(node.parameters_text(), "{}");
    }

    #[test]
    fn credential_references_are_deduplicated() {
        let mut wf = Workflow::new("wf1", "(Sync)", true);
        let mut a = Node::new("a", "A", "x");
        a.credentials = vec!["cred-1".into()];
        let mut b = Node::new("b", "B", "x");
        b.credentials = vec!["cred-1".into(), "cred-2".into()];
        wf.nodes = vec![a, b];

        let refs: Vec<&str> = wf.credential_references().into_iter().collect();
        assert_eq!(refs, vec!["cred-1", "cred-2"]);
    }
}
