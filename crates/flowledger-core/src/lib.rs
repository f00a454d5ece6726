pub mod alert;
pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fleet;
pub mod instance;
pub mod parser;
pub mod providers;
pub mod scanner;
pub mod security;
pub mod version;

pub use analyzer::report::{FindingType, ScanReport, ScanStats, SecurityFinding, Severity};
pub use classifier::WorkflowStatus;
pub use error::{ClientError, ConfigError, ErrorKind, ParseError, ScanError};
pub use instance::{Environment, Instance};
pub use parser::credential::Credential;
pub use parser::workflow::{Node, Workflow};
pub use providers::n8n_api::N8nClient;
pub use providers::WorkflowSource;
pub use scanner::{scan_instance, ScanOptions};
