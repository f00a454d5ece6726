pub mod canonical;
pub mod credential;
pub mod n8n;
pub mod workflow;
