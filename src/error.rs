//! Error types for rootcause
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;
use crate::retrieval::RetrievalError;

/// All error types that can occur outside the diagnostic loop
#[derive(Debug, Error)]
pub enum TriageError {
    /// LLM API error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Retrieval index error
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Report or export could not be written
    #[error("Report error: {0}")]
    Report(String),

    /// Ticket system error
    #[error("Jira error: {0}")]
    Jira(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for rootcause operations
pub type Result<T> = std::result::Result<T, TriageError>;
