use crate::analyzer::report::{FindingType, SecurityFinding, Severity};
use crate::parser::workflow::Workflow;
use serde_json::{json, Map};

/// A node type that should no longer be used.
pub struct DeprecationRule {
    pub node_type: &'static str,
    pub replacement: &'static str,
    pub reason: &'static str,
}

pub const DEPRECATED_NODES: &[DeprecationRule] = &[
    DeprecationRule {
        node_type: "n8n-nodes-base.httpRequest",
        replacement: "HTTP Request (n8n-nodes-base.httpRequestV2)",
        reason: "The new HTTP Request node offers improved security, better error handling, and \
                 more authentication options including OAuth 2.0 support.",
    },
    DeprecationRule {
        node_type: "n8n-nodes-base.ftp",
        replacement: "SFTP or Cloud Storage nodes (Google Drive, Dropbox, etc.)",
        reason: "FTP transmits data in plaintext. Use SFTP for encrypted file transfers or modern \
                 cloud storage solutions for better security.",
    },
    DeprecationRule {
        node_type: "n8n-nodes-base.sftp",
        replacement: "SSH File Transfer (n8n-nodes-base.ssh) or Cloud Storage nodes",
        reason: "The SSH node provides better security controls and the cloud storage nodes \
                 offer modern authentication methods like OAuth 2.0.",
    },
    DeprecationRule {
        node_type: "n8n-nodes-base.executeCommand",
        replacement: "Code node with strict input validation",
        reason: "Direct command execution poses injection risks. Use the Code node with proper \
                 input sanitisation and validation instead.",
    },
    DeprecationRule {
        node_type: "n8n-nodes-base.function",
        replacement: "Code node (n8n-nodes-base.code)",
        reason: "The Code node provides better security controls, sandboxed execution, and \
                 supports both JavaScript and Python.",
    },
];

pub fn lookup(node_type: &str) -> Option<&'static DeprecationRule> {
    DEPRECATED_NODES.iter().find(|rule| rule.node_type == node_type)
}

/// Flag nodes whose type exactly matches a deprecated node type.
pub fn detect_deprecated(workflow: &Workflow) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    for node in &workflow.nodes {
        let Some(rule) = lookup(&node.node_type) else {
            continue;
        };

        let mut finding = SecurityFinding::new(
            format!("deprecated-{}-{}", workflow.id, node.id),
            FindingType::Deprecated,
            Severity::Medium,
            "Deprecated Node Detected",
            format!(
                "Node \"{}\" uses deprecated node type \"{}\"",
                node.name, node.node_type
            ),
            &workflow.instance_id,
        );
        finding.workflow_id = Some(workflow.id.clone());
        finding.workflow_name = Some(workflow.name.clone());
        finding.node_id = Some(node.id.clone());
        finding.suggestion = Some(rule.replacement.to_string());

        let mut metadata = Map::new();
        metadata.insert("deprecatedNodeType".into(), json!(node.node_type));
        metadata.insert("recommendedReplacement".into(), json!(rule.replacement));
        metadata.insert("reason".into(), json!(rule.reason));
        metadata.insert("source".into(), json!("static"));
        finding.metadata = Some(metadata);

        findings.push(finding);
    }

    findings
}
