pub mod credential_usage;
pub mod deprecated;
pub mod plaintext;
pub mod weak_auth;

use crate::analyzer::report::SecurityFinding;
use crate::parser::workflow::Workflow;

/// Run all per-workflow detectors on one workflow.
pub fn scan_workflow(workflow: &Workflow) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();
    findings.extend(plaintext::detect_plaintext(workflow));
    findings.extend(deprecated::detect_deprecated(workflow));
    findings.extend(weak_auth::detect_weak_auth(workflow));
    findings
}
