//! Error types for the pipeline stages.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use convo_classify::ClassificationError;
use convo_storage::StorageError;
use convo_types::ConvoError;

/// Errors that can occur while running a pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input path or record missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conversation has no human participant or cannot be decoded
    #[error("Malformed conversation: {0}")]
    MalformedConversation(String),

    /// Classifier unavailable, errored, or timed out
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    /// Record could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Stored record does not have the expected shape
    #[error("Schema mismatch: {0}")]
    Schema(String),

    /// Invalid stage parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => PipelineError::NotFound(what),
            StorageError::Serialization(msg) => PipelineError::Schema(msg),
            other => PipelineError::Persistence(other.to_string()),
        }
    }
}

impl From<ConvoError> for PipelineError {
    fn from(err: ConvoError) -> Self {
        match err {
            ConvoError::Schema(msg) => PipelineError::Schema(msg),
            ConvoError::Serialization(e) => PipelineError::Schema(e.to_string()),
            ConvoError::Config(msg) | ConvoError::InvalidInput(msg) => {
                PipelineError::InvalidInput(msg)
            }
        }
    }
}

impl PipelineError {
    /// Error category, for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::MalformedConversation(_) => ErrorKind::MalformedConversation,
            PipelineError::Classification(_) => ErrorKind::Classification,
            PipelineError::Persistence(_) => ErrorKind::Persistence,
            PipelineError::Schema(_) => ErrorKind::Schema,
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Error category of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    MalformedConversation,
    Classification,
    Persistence,
    Schema,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::MalformedConversation => "MalformedConversationError",
            ErrorKind::Classification => "ClassificationError",
            ErrorKind::Persistence => "PersistenceError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::InvalidInput => "InvalidInputError",
        };
        write!(f, "{}", name)
    }
}

impl From<&StorageError> for ErrorKind {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Serialization(_) => ErrorKind::Schema,
            _ => ErrorKind::Persistence,
        }
    }
}

impl From<&ConvoError> for ErrorKind {
    fn from(err: &ConvoError) -> Self {
        match err {
            ConvoError::Schema(_) | ConvoError::Serialization(_) => ErrorKind::Schema,
            ConvoError::Config(_) | ConvoError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// One segment that a stage skipped because of an error.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentFailure {
    /// Segment key, when it could be determined
    pub key: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl SegmentFailure {
    pub fn new(key: Option<String>, error: &PipelineError) -> Self {
        Self {
            key,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for SegmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} [segment {}]: {}", self.kind, key, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kinds() {
        let err: PipelineError = ClassificationError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(err.kind(), ErrorKind::Classification);

        let err: PipelineError = StorageError::NotFound("in.json".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: PipelineError = StorageError::Persistence("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::Persistence);

        let err: PipelineError = StorageError::Serialization("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let err: PipelineError = ConvoError::InvalidInput("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_kinds_of_lower_layer_errors() {
        let cases = [
            StorageError::NotFound("in.json".into()),
            StorageError::Serialization("bad".into()),
            StorageError::InvalidKey("../x".into()),
            StorageError::Io(std::io::Error::other("denied")),
        ];
        for err in cases {
            let kind = ErrorKind::from(&err);
            assert_eq!(PipelineError::from(err).kind(), kind);
        }

        assert_eq!(ErrorKind::from(&ConvoError::Config("x".into())), ErrorKind::InvalidInput);
        assert_eq!(ErrorKind::from(&ConvoError::Schema("x".into())), ErrorKind::Schema);
    }

    #[test]
    fn test_failure_display() {
        let err = PipelineError::MalformedConversation("conversation 7 has no human".into());
        let failure = SegmentFailure::new(Some("alice_7".into()), &err);
        assert_eq!(
            failure.to_string(),
            "MalformedConversationError [segment alice_7]: Malformed conversation: conversation 7 has no human"
        );

        let failure = SegmentFailure::new(None, &err);
        assert!(failure.to_string().starts_with("MalformedConversationError: "));
    }

    #[test]
    fn test_failure_serializes_kind() {
        let err = PipelineError::Persistence("disk full".into());
        let value = serde_json::to_value(SegmentFailure::new(None, &err)).unwrap();
        assert_eq!(value["kind"], "persistence");
        assert!(value["key"].is_null());
    }
}
