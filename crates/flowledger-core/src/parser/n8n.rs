use crate::error::ParseError;
use crate::parser::credential::{Credential, CredentialMetadata, CredentialSource};
use crate::parser::workflow::{Connection, Node, Position, Workflow};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

/// Normalizes n8n public API payloads into canonical workflows and credentials.
pub struct N8nParser;

impl N8nParser {
    /// Parse a workflow listing. Accepts both `{ "data": [...] }` and a bare array.
    ///
    /// Entries without a usable id are kept under `index-{n}` so they still
    /// count toward the totals; entries that are not objects are skipped.
    pub fn parse_workflows(payload: &Value, instance_id: &str) -> Result<Vec<Workflow>, ParseError> {
        let items = Self::list_items(payload)?;
        let mut workflows = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if !item.is_object() {
                warn!(instance = instance_id, index, "skipping workflow entry that is not an object");
                continue;
            }
            let id = match item.get("id").and_then(id_string) {
                Some(id) => id,
                None => {
                    let id = format!("index-{}", index);
                    warn!(instance = instance_id, id = %id, "workflow entry without an id");
                    id
                }
            };
            workflows.push(Self::build_workflow(item, id, instance_id));
        }
        Ok(workflows)
    }

    /// Parse one workflow object. Returns `None` when the entry has no usable id.
    pub fn parse_workflow(raw: &Value, instance_id: &str) -> Option<Workflow> {
        let id = raw.get("id").and_then(id_string)?;
        Some(Self::build_workflow(raw, id, instance_id))
    }

    fn build_workflow(raw: &Value, id: String, instance_id: &str) -> Workflow {
        let name = raw
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let nodes = match raw.get("nodes").and_then(|v| v.as_array()) {
            Some(nodes) => nodes
                .iter()
                .enumerate()
                .filter_map(|(idx, node)| {
                    let parsed = Self::parse_node(node, idx);
                    if parsed.is_none() {
                        warn!(workflow = %id, index = idx, "skipping malformed node");
                    }
                    parsed
                })
                .collect(),
            None => Vec::new(),
        };

        Workflow {
            n8n_id: id.clone(),
            id,
            name,
            is_active: raw.get("active").and_then(|v| v.as_bool()).unwrap_or(false),
            nodes,
            connections: raw
                .get("connections")
                .map(Self::parse_connections)
                .unwrap_or_default(),
            tags: raw.get("tags").map(Self::parse_tags).unwrap_or_default(),
            owner: raw.get("owner").and_then(owner_string),
            created_at: raw.get("createdAt").and_then(parse_timestamp),
            updated_at: raw.get("updatedAt").and_then(parse_timestamp),
            instance_id: instance_id.to_string(),
        }
    }

    fn parse_node(raw: &Value, index: usize) -> Option<Node> {
        let obj = raw.as_object()?;

        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        // Older exports omit node ids; fall back to the name, then the position in the list.
        let id = obj
            .get("id")
            .and_then(id_string)
            .or_else(|| (!name.is_empty()).then(|| name.clone()))
            .unwrap_or_else(|| format!("node-{}", index));

        let parameters = match obj.get("parameters") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        Some(Node {
            id,
            name,
            node_type: obj
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            parameters,
            credentials: obj
                .get("credentials")
                .map(Self::parse_node_credentials)
                .unwrap_or_default(),
            position: obj.get("position").map(parse_position).unwrap_or_default(),
        })
    }

    /// Flatten a node's credential block into reference strings.
    ///
    /// n8n stores `{ "<credentialType>": { "id": "...", "name": "..." } }`.
    /// Each entry yields its remote id when present, else its name, else the
    /// type key. Already-flat string lists pass through unchanged.
    pub fn parse_node_credentials(raw: &Value) -> Vec<String> {
        let mut refs = Vec::new();
        match raw {
            Value::Object(map) => {
                for (cred_type, entry) in map {
                    let reference = match entry {
                        Value::Object(inner) => inner
                            .get("id")
                            .and_then(id_string)
                            .or_else(|| inner.get("name").and_then(non_empty_str)),
                        Value::String(s) if !s.is_empty() => Some(s.clone()),
                        _ => None,
                    };
                    refs.push(reference.unwrap_or_else(|| cred_type.clone()));
                }
            }
            Value::Array(items) => {
                refs.extend(items.iter().filter_map(non_empty_str));
            }
            _ => {}
        }
        refs.dedup();
        refs
    }

    /// Flatten n8n's `{ source: { outputType: [[{ node, type, index }]] } }` map.
    pub fn parse_connections(raw: &Value) -> Vec<Connection> {
        let mut result = Vec::new();
        let Some(sources) = raw.as_object() else {
            return result;
        };

        for (source_node, outputs) in sources {
            let Some(outputs) = outputs.as_object() else {
                continue;
            };
            for (output_type, branches) in outputs {
                let Some(branches) = branches.as_array() else {
                    continue;
                };
                for (branch_idx, branch) in branches.iter().enumerate() {
                    // Each output index holds a list of targets; tolerate a flat list too.
                    let targets: Vec<&Value> = match branch {
                        Value::Array(items) => items.iter().collect(),
                        Value::Object(_) => vec![branch],
                        _ => continue,
                    };
                    for target in targets {
                        let Some(to) = target.get("node").and_then(|v| v.as_str()) else {
                            continue;
                        };
                        let to_input = target
                            .get("type")
                            .or_else(|| target.get("input"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("main");
                        let from_output = if branch_idx == 0 {
                            output_type.clone()
                        } else {
                            format!("{}[{}]", output_type, branch_idx)
                        };
                        result.push(Connection {
                            from: source_node.clone(),
                            to: to.to_string(),
                            from_output,
                            to_input: to_input.to_string(),
                        });
                    }
                }
            }
        }

        result
    }

    /// Tags arrive as `{ id, name, ... }` objects on newer instances, strings on older ones.
    pub fn parse_tags(raw: &Value) -> Vec<String> {
        raw.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|tag| match tag {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(obj) => obj.get("name").and_then(non_empty_str),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse a credential listing. Accepts both `{ "data": [...] }` and a bare array.
    pub fn parse_credentials(payload: &Value, instance_id: &str) -> Result<Vec<Credential>, ParseError> {
        let items = Self::list_items(payload)?;
        Ok(items
            .iter()
            .filter_map(|item| Self::parse_credential(item, instance_id))
            .collect())
    }

    pub fn parse_credential(raw: &Value, instance_id: &str) -> Option<Credential> {
        let id = raw.get("id").and_then(id_string)?;
        let updated_at = raw.get("updatedAt").and_then(parse_timestamp);

        Some(Credential {
            n8n_id: id.clone(),
            name: raw
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&id)
                .to_string(),
            id,
            credential_type: raw
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            instance_id: instance_id.to_string(),
            used_by: Vec::new(),
            source: CredentialSource::Remote,
            metadata: CredentialMetadata {
                description: raw.get("description").and_then(non_empty_str),
                owner: raw.get("owner").and_then(owner_string),
                tags: raw.get("tags").map(Self::parse_tags).unwrap_or_default(),
                risk_level: Default::default(),
                last_used: updated_at,
            },
            created_at: raw.get("createdAt").and_then(parse_timestamp),
            updated_at,
        })
    }

    /// Cursor for the next page of a paginated listing, if any.
    pub fn next_cursor(payload: &Value) -> Option<String> {
        payload
            .get("nextCursor")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    fn list_items(payload: &Value) -> Result<&Vec<Value>, ParseError> {
        match payload {
            Value::Array(items) => Ok(items),
            Value::Object(obj) => match obj.get("data") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(ParseError::UnexpectedShape {
                    expected: "an array or an object with a 'data' array",
                    found: describe(payload),
                }),
            },
            _ => Err(ParseError::UnexpectedShape {
                expected: "an array or an object with a 'data' array",
                found: describe(payload),
            }),
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "a boolean".into(),
        Value::Number(_) => "a number".into(),
        Value::String(_) => "a string".into(),
        Value::Array(_) => "an array".into(),
        Value::Object(obj) => format!(
            "an object with keys [{}]",
            obj.keys().cloned().collect::<Vec<_>>().join(", ")
        ),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(String::from)
}

fn owner_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("email")
            .or_else(|| obj.get("name"))
            .and_then(non_empty_str),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_position(value: &Value) -> Position {
    match value {
        Value::Array(items) if items.len() >= 2 => Position {
            x: items[0].as_f64().unwrap_or(0.0),
            y: items[1].as_f64().unwrap_or(0.0),
        },
        Value::Object(obj) => Position {
            x: obj.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0),
            y: obj.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0),
        },
        _ => Position::default(),
    }
}
