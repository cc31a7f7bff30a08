//! Error types for the conversation sentiment pipeline.

use thiserror::Error;

/// Error type for domain-level validation and configuration.
#[derive(Debug, Error)]
pub enum ConvoError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document does not match the expected shape
    #[error("Schema mismatch: {0}")]
    Schema(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
