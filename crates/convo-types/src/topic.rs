//! Topic hits and per-segment topic buckets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message classified above threshold for one topic.
///
/// The topic itself is the key of the enclosing [`TopicBucket`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHit {
    /// Timestamp of the source message, copied verbatim
    #[serde(rename = "transaction_datetime_utc")]
    pub timestamp: Value,

    /// Trimmed message text
    pub message: String,

    /// Classifier confidence for the topic, rounded to 3 decimals
    #[serde(rename = "score")]
    pub relevance_score: f64,
}

impl TopicHit {
    /// Create a hit, rounding the score to 3 decimals.
    pub fn new(timestamp: impl Into<Value>, message: impl Into<String>, score: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: message.into(),
            relevance_score: round_score(score),
        }
    }
}

/// Topic name to hits, for one segment. Only topics with hits are present.
pub type TopicBucket = BTreeMap<String, Vec<TopicHit>>;

/// Round a score to 3 decimal places.
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
