//! Sentiment labels, per-topic sentiment records and overall reports.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConvoError;

/// Binary sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "POSITIVE"),
            SentimentLabel::Negative => write!(f, "NEGATIVE"),
        }
    }
}

impl FromStr for SentimentLabel {
    type Err = ConvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(SentimentLabel::Positive),
            "NEGATIVE" => Ok(SentimentLabel::Negative),
            other => Err(ConvoError::InvalidInput(format!(
                "unknown sentiment label: {}",
                other
            ))),
        }
    }
}

/// Majority vote over label counts. Equal counts resolve to POSITIVE.
pub fn majority_label(positive_count: usize, negative_count: usize) -> SentimentLabel {
    if positive_count >= negative_count {
        SentimentLabel::Positive
    } else {
        SentimentLabel::Negative
    }
}

/// One retained message with its sentiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMessage {
    pub timestamp: Value,
    pub message: String,
    pub sentiment: SentimentLabel,
    pub sentiment_score: f64,
    pub relevance_score: f64,
}

/// Aggregated sentiment for one topic of one segment.
///
/// `positive_count + negative_count == messages.len()` and
/// `overall_sentiment` is derived from the two counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub overall_sentiment: SentimentLabel,
    pub positive_count: usize,
    pub negative_count: usize,
    pub messages: Vec<ScoredMessage>,
}

impl SentimentRecord {
    /// Build a record from scored messages, counting labels and voting.
    pub fn from_messages(messages: Vec<ScoredMessage>) -> Self {
        let positive_count = messages
            .iter()
            .filter(|m| m.sentiment == SentimentLabel::Positive)
            .count();
        let negative_count = messages.len() - positive_count;

        Self {
            overall_sentiment: majority_label(positive_count, negative_count),
            positive_count,
            negative_count,
            messages,
        }
    }

    /// Check the count and vote invariants, e.g. after reading from disk.
    pub fn validate(&self) -> Result<(), ConvoError> {
        if self.positive_count + self.negative_count != self.messages.len() {
            return Err(ConvoError::Schema(format!(
                "counts {}+{} do not match {} messages",
                self.positive_count,
                self.negative_count,
                self.messages.len()
            )));
        }
        let expected = majority_label(self.positive_count, self.negative_count);
        if self.overall_sentiment != expected {
            return Err(ConvoError::Schema(format!(
                "overall_sentiment {} does not match counts (expected {})",
                self.overall_sentiment, expected
            )));
        }
        Ok(())
    }
}

/// Topic name to sentiment record, for one segment.
pub type SentimentSummary = BTreeMap<String, SentimentRecord>;

/// Topic name to overall sentiment label, for one segment.
pub type OverallReport = BTreeMap<String, SentimentLabel>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored(label: SentimentLabel) -> ScoredMessage {
        ScoredMessage {
            timestamp: "t".into(),
            message: "m".to_string(),
            sentiment: label,
            sentiment_score: 0.9,
            relevance_score: 0.8,
        }
    }

    #[test]
    fn test_majority_tie_is_positive() {
        assert_eq!(majority_label(1, 1), SentimentLabel::Positive);
        assert_eq!(majority_label(0, 0), SentimentLabel::Positive);
        assert_eq!(majority_label(1, 2), SentimentLabel::Negative);
        assert_eq!(majority_label(3, 2), SentimentLabel::Positive);
    }

    #[test]
    fn test_record_from_messages() {
        let record = SentimentRecord::from_messages(vec![
            scored(SentimentLabel::Negative),
            scored(SentimentLabel::Positive),
            scored(SentimentLabel::Negative),
        ]);
        assert_eq!(record.positive_count, 1);
        assert_eq!(record.negative_count, 2);
        assert_eq!(record.overall_sentiment, SentimentLabel::Negative);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_counts() {
        let mut record = SentimentRecord::from_messages(vec![scored(SentimentLabel::Positive)]);
        record.negative_count = 4;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("positive".parse::<SentimentLabel>().unwrap(), SentimentLabel::Positive);
        assert_eq!("NEGATIVE".parse::<SentimentLabel>().unwrap(), SentimentLabel::Negative);
        assert!("NEUTRAL".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn test_record_document_shape() {
        let record = SentimentRecord::from_messages(vec![scored(SentimentLabel::Positive)]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["overall_sentiment"], json!("POSITIVE"));
        assert_eq!(value["positive_count"], json!(1));
        assert_eq!(value["messages"][0]["sentiment"], json!("POSITIVE"));
    }
}
