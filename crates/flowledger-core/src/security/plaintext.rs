use crate::analyzer::report::{FindingType, SecurityFinding, Severity};
use crate::parser::workflow::Workflow;
use regex::Regex;
use serde_json::{json, Map};
use std::sync::OnceLock;

struct SecretPattern {
    rule: &'static str,
    description: &'static str,
    regex: &'static str,
}

// Each pattern accepts two shapes of parameter text: a free-text assignment
// such as `password: hunter2`, and a JSON key whose value is a quoted literal.
// The JSON form skips booleans, numbers, empty strings and `={{ ... }}`
// expressions.
const SECRET_PATTERNS: &[SecretPattern] = &[
    SecretPattern {
        rule: "password",
        description: "password assignment",
        regex: r#"(?i)password(?:\s*[:=]\s*["']?[^"'\s]+|"\s*:\s*"[^"=\s])"#,
    },
    SecretPattern {
        rule: "api_key",
        description: "API key assignment",
        regex: r#"(?i)api[_-]?key(?:\s*[:=]\s*["']?[^"'\s]+|"\s*:\s*"[^"=\s])"#,
    },
    SecretPattern {
        rule: "secret",
        description: "secret assignment",
        regex: r#"(?i)secret(?:\s*[:=]\s*["']?[^"'\s]+|"\s*:\s*"[^"=\s])"#,
    },
    SecretPattern {
        rule: "token",
        description: "token assignment",
        regex: r#"(?i)token(?:\s*[:=]\s*["']?[^"'\s]+|"\s*:\s*"[^"=\s])"#,
    },
];

fn compiled() -> &'static [(&'static SecretPattern, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static SecretPattern, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SECRET_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p.regex).ok().map(|re| (p, re)))
            .collect()
    })
}

/// Detect secrets written inline into node parameters.
///
/// Every pattern that matches a node yields its own finding; a node holding
/// both a password and a token produces two.
pub fn detect_plaintext(workflow: &Workflow) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    for node in &workflow.nodes {
        let text = node.parameters_text();

        for (pattern, re) in compiled() {
            if !re.is_match(&text) {
                continue;
            }

            let mut finding = SecurityFinding::new(
                format!("plaintext-{}-{}-{}", workflow.id, node.id, pattern.rule),
                FindingType::Plaintext,
                Severity::High,
                "Plaintext Credential Detected",
                format!(
                    "Node \"{}\" contains what appears to be a plaintext credential ({})",
                    node.name, pattern.description
                ),
                &workflow.instance_id,
            );
            finding.workflow_id = Some(workflow.id.clone());
            finding.workflow_name = Some(workflow.name.clone());
            finding.node_id = Some(node.id.clone());
            finding.suggestion = Some(
                "Move the value into an n8n credential and reference it from the node instead of \
                 hardcoding it in parameters."
                    .to_string(),
            );

            let mut metadata = Map::new();
            metadata.insert("nodeType".into(), json!(node.node_type));
            metadata.insert("pattern".into(), json!(pattern.rule));
            finding.metadata = Some(metadata);

            findings.push(finding);
        }
    }

    findings
}
