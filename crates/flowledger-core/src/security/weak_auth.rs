use crate::analyzer::report::{FindingType, SecurityFinding, Severity};
use crate::parser::workflow::Workflow;
use regex::Regex;
use serde_json::{json, Map};
use std::sync::OnceLock;

struct WeakAuthPattern {
    rule: &'static str,
    description: &'static str,
    suggestion: &'static str,
    regex: &'static str,
}

const WEAK_AUTH_PATTERNS: &[WeakAuthPattern] = &[
    WeakAuthPattern {
        rule: "insecure_transport",
        description: "sends requests over plain HTTP",
        suggestion: "Switch the endpoint to https:// so credentials and payloads are encrypted in transit.",
        regex: r"(?i)http://",
    },
    WeakAuthPattern {
        rule: "basic_auth",
        description: "relies on basic authentication",
        suggestion: "Prefer OAuth 2.0 or scoped API tokens stored as n8n credentials over basic auth.",
        regex: r"(?i)basic\s+auth",
    },
    WeakAuthPattern {
        rule: "bearer_token",
        description: "carries a bearer token in its parameters",
        suggestion: "Store the token in a Header Auth credential instead of the node parameters.",
        regex: r"(?i)bearer\s+token",
    },
];

fn compiled() -> &'static [(&'static WeakAuthPattern, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static WeakAuthPattern, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        WEAK_AUTH_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p.regex).ok().map(|re| (p, re)))
            .collect()
    })
}

/// Detect plaintext transport and hardcoded auth schemes in node parameters.
pub fn detect_weak_auth(workflow: &Workflow) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    for node in &workflow.nodes {
        let text = node.parameters_text();

        for (pattern, re) in compiled() {
            if !re.is_match(&text) {
                continue;
            }

            let mut finding = SecurityFinding::new(
                format!("weak-auth-{}-{}-{}", workflow.id, node.id, pattern.rule),
                FindingType::WeakAuth,
                Severity::Medium,
                "Weak Authentication Detected",
                format!(
                    "Node \"{}\" uses weak authentication method: it {}",
                    node.name, pattern.description
                ),
                &workflow.instance_id,
            );
            finding.workflow_id = Some(workflow.id.clone());
            finding.workflow_name = Some(workflow.name.clone());
            finding.node_id = Some(node.id.clone());
            finding.suggestion = Some(pattern.suggestion.to_string());

            let mut metadata = Map::new();
            metadata.insert("nodeType".into(), json!(node.node_type));
            metadata.insert("pattern".into(), json!(pattern.rule));
            finding.metadata = Some(metadata);

            findings.push(finding);
        }
    }

    findings
}
