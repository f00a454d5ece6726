use crate::analyzer::report::{FindingType, SecurityFinding, Severity};
use crate::parser::credential::Credential;
use crate::parser::workflow::Workflow;
use serde_json::{json, Map};
use std::collections::BTreeSet;

/// Usage above this many workflows marks a credential as over-shared.
pub const SHARED_THRESHOLD: usize = 3;

/// Number of distinct workflows with at least one node referencing `credential`.
pub fn usage_count(credential: &Credential, workflows: &[&Workflow]) -> usize {
    workflows
        .iter()
        .filter(|wf| {
            wf.nodes
                .iter()
                .any(|node| node.credentials.iter().any(|r| credential.matches_reference(r)))
        })
        .map(|wf| wf.id.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Flag credentials nothing uses and credentials shared by too many workflows.
///
/// `workflows` is the usage universe; the scanner passes only active
/// workflows.
pub fn detect_credential_usage(
    credentials: &[Credential],
    workflows: &[&Workflow],
) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    for credential in credentials {
        let usage = usage_count(credential, workflows);

        let mut finding = if usage == 0 {
            let mut f = SecurityFinding::new(
                format!("unused-credential-{}", credential.id),
                FindingType::Unused,
                Severity::Medium,
                "Unused Credential",
                format!(
                    "Credential \"{}\" is not referenced by any active workflow",
                    credential.name
                ),
                &credential.instance_id,
            );
            f.suggestion = Some(
                "Delete the credential if it is no longer needed, or rotate it if it may have \
                 leaked."
                    .to_string(),
            );
            f
        } else if usage > SHARED_THRESHOLD {
            let mut f = SecurityFinding::new(
                format!("shared-credential-{}", credential.id),
                FindingType::SharedKey,
                Severity::High,
                "Shared Credential",
                format!(
                    "Credential \"{}\" is used by {} workflows",
                    credential.name, usage
                ),
                &credential.instance_id,
            );
            f.suggestion = Some(
                "Split the credential into per-workflow credentials to limit the blast radius \
                 if it is compromised."
                    .to_string(),
            );
            f
        } else {
            continue;
        };

        finding.credential_id = Some(credential.id.clone());
        let mut metadata = Map::new();
        metadata.insert("credentialType".into(), json!(credential.credential_type));
        metadata.insert("usageCount".into(), json!(usage));
        metadata.insert("source".into(), json!(credential.source));
        finding.metadata = Some(metadata);

        findings.push(finding);
    }

    findings
}

/// Attach usage to remote credentials and infer credentials for node
/// references that match none of them.
///
/// When the credentials endpoint was unavailable `remote` is empty and every
/// reference in `workflows` becomes an inferred credential.
pub fn reconcile_credentials(
    remote: Vec<Credential>,
    workflows: &[&Workflow],
    instance_id: &str,
) -> Vec<Credential> {
    let mut credentials = remote;

    let references: BTreeSet<&str> = workflows
        .iter()
        .flat_map(|wf| wf.credential_references())
        .collect();

    for reference in references {
        if credentials.iter().any(|c| c.matches_reference(reference)) {
            continue;
        }
        let mut inferred = Credential::inferred(reference);
        inferred.instance_id = instance_id.to_string();
        credentials.push(inferred);
    }

    for credential in &mut credentials {
        if credential.instance_id.is_empty() {
            credential.instance_id = instance_id.to_string();
        }
        let used_by: BTreeSet<String> = workflows
            .iter()
            .filter(|wf| {
                wf.nodes
                    .iter()
                    .any(|n| n.credentials.iter().any(|r| credential.matches_reference(r)))
            })
            .map(|wf| wf.id.clone())
            .collect();
        credential.used_by = used_by.into_iter().collect();
    }

    credentials
}
