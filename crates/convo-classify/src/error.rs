//! Classification error types.

use std::time::Duration;

use thiserror::Error;

/// Error type for classifier calls.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl ClassificationError {
    /// Whether a transport may retry the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClassificationError::ApiError(_)
                | ClassificationError::RateLimitExceeded
                | ClassificationError::Unavailable(_)
        )
    }
}
