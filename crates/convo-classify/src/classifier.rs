//! Classifier capability traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use convo_types::SentimentLabel;

use crate::error::ClassificationError;

/// Score of one candidate label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicScore {
    pub label: String,
    /// Independent confidence in [0, 1]; scores across labels need not sum to 1
    pub score: f64,
}

impl TopicScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Sentiment of one text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub score: f64,
}

impl SentimentScore {
    pub fn new(label: SentimentLabel, score: f64) -> Self {
        Self { label, score }
    }
}

/// Multi-label topic classifier.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    /// Score `text` against every label in `labels`, one score per label.
    async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<Vec<TopicScore>, ClassificationError>;
}

/// Binary sentiment classifier.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<SentimentScore, ClassificationError>;
}

/// Run a classifier call with a deadline; expiry becomes `ClassificationError::Timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, ClassificationError>
where
    F: Future<Output = Result<T, ClassificationError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ClassificationError::Timeout(timeout)),
    }
}
