//! Unified error types for Arbor

use thiserror::Error;

/// Unified error type for all Arbor operations
///
/// Step-level outcomes (a failed agent call, a failed test command, a review
/// rejection) are result values inspected by the retry loop, never errors.
/// This enum covers the environment failures the retry loop cannot remediate.
#[derive(Error, Debug)]
pub enum ArborError {
    // Tree errors
    #[error("Dependency cycle: {0}")]
    Cycle(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // VCS errors
    #[error("Git command failed: {0}")]
    GitCommand(String),

    // Agent errors
    #[error("Agent auth error: {0}")]
    AgentAuth(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using ArborError
pub type Result<T> = std::result::Result<T, ArborError>;
