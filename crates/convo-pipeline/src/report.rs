//! Overall sentiment reports.

use convo_types::{OverallReport, SentimentSummary};

/// Project each topic's record down to its overall sentiment label.
pub fn build_report(summary: &SentimentSummary) -> OverallReport {
    summary
        .iter()
        .map(|(topic, record)| (topic.clone(), record.overall_sentiment))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_types::{ScoredMessage, SentimentLabel, SentimentRecord};

    fn scored(label: SentimentLabel) -> ScoredMessage {
        ScoredMessage {
            timestamp: "t".into(),
            message: "m".into(),
            sentiment: label,
            sentiment_score: 0.9,
            relevance_score: 0.8,
        }
    }

    #[test]
    fn test_report_copies_labels() {
        let mut summary = SentimentSummary::new();
        summary.insert(
            "app_usability".into(),
            SentimentRecord::from_messages(vec![
                scored(SentimentLabel::Positive),
                scored(SentimentLabel::Negative),
            ]),
        );
        summary.insert(
            "technical_support".into(),
            SentimentRecord::from_messages(vec![scored(SentimentLabel::Negative)]),
        );

        let report = build_report(&summary);
        assert_eq!(report.len(), summary.len());
        for (topic, record) in &summary {
            assert_eq!(report[topic], record.overall_sentiment);
        }
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"app_usability": "POSITIVE", "technical_support": "NEGATIVE"})
        );
    }

    #[test]
    fn test_empty_summary() {
        assert!(build_report(&SentimentSummary::new()).is_empty());
    }
}
