//! Topic bucketing.
//!
//! Scores every human message of a segment against the candidate topics and
//! groups the messages whose score clears the threshold by topic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use convo_classify::{with_timeout, ClassificationError, TopicClassifier, TopicScore};
use convo_types::{
    round_score, Conversation, Message, Settings, TopicBucket, TopicHit, DEFAULT_OPERATOR_ID,
};

use crate::error::PipelineError;

/// Configuration for topic bucketing.
#[derive(Debug, Clone)]
pub struct BucketerConfig {
    candidates: Vec<String>,
    threshold: f64,
    concurrency: usize,
    timeout: Duration,
    operator_id: i64,
}

impl BucketerConfig {
    /// Create a config; candidates are trimmed and deduplicated.
    pub fn new(candidates: Vec<String>, threshold: f64) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidInput(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        let mut seen = HashSet::new();
        let candidates: Vec<String> = candidates
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();
        if candidates.is_empty() {
            return Err(PipelineError::InvalidInput(
                "at least one candidate topic is required".to_string(),
            ));
        }

        Ok(Self {
            candidates,
            threshold,
            concurrency: 4,
            timeout: Duration::from_secs(90),
            operator_id: DEFAULT_OPERATOR_ID,
        })
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        Ok(Self::new(settings.topics.candidates.clone(), settings.topics.threshold)?
            .with_concurrency(settings.topics.concurrency)
            .with_timeout(settings.topics.timeout())
            .with_operator_id(settings.operator_id))
    }

    /// Set concurrent classifier calls per segment (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_operator_id(mut self, operator_id: i64) -> Self {
        self.operator_id = operator_id;
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Groups a segment's messages by topic using a [`TopicClassifier`].
pub struct TopicBucketer {
    classifier: Arc<dyn TopicClassifier>,
    config: BucketerConfig,
}

impl TopicBucketer {
    pub fn new(classifier: Arc<dyn TopicClassifier>, config: BucketerConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &BucketerConfig {
        &self.config
    }

    /// Bucket the human messages of one segment by topic.
    ///
    /// Any classifier failure fails the whole segment. Only topics with at
    /// least one hit appear in the result; hits keep message order.
    pub async fn extract_topics(&self, conversation: &Conversation) -> Result<TopicBucket, PipelineError> {
        let messages: Vec<&Message> = conversation
            .human_messages(self.config.operator_id)
            .filter(|m| !m.trimmed_text().is_empty())
            .collect();

        let classifier = &self.classifier;
        let labels = self.config.candidates.as_slice();
        let timeout = self.config.timeout;

        let scored: Vec<Vec<TopicScore>> = stream::iter(messages.iter().map(|message| {
            let text = message.trimmed_text();
            async move {
                debug!(chars = text.len(), labels = labels.len(), "Classifying topics");
                with_timeout(timeout, classifier.classify(text, labels)).await
            }
        }))
        .buffered(self.config.concurrency)
        .try_collect()
        .await?;

        let mut bucket = TopicBucket::new();
        for (message, scores) in messages.iter().zip(scored) {
            self.check_scores(&scores)?;
            for score in scores {
                if score.score >= self.config.threshold
                    && round_score(score.score) >= self.config.threshold
                {
                    bucket.entry(score.label).or_default().push(TopicHit::new(
                        message.timestamp.clone(),
                        message.trimmed_text(),
                        score.score,
                    ));
                }
            }
        }

        Ok(bucket)
    }

    /// A response must score every candidate exactly once, within [0, 1].
    fn check_scores(&self, scores: &[TopicScore]) -> Result<(), ClassificationError> {
        let mut seen = HashSet::new();
        for score in scores {
            if !self.config.candidates.contains(&score.label) {
                return Err(ClassificationError::InvalidResponse(format!(
                    "label {:?} is not a candidate topic",
                    score.label
                )));
            }
            if !seen.insert(score.label.as_str()) {
                return Err(ClassificationError::InvalidResponse(format!(
                    "label {:?} scored more than once",
                    score.label
                )));
            }
            if !(0.0..=1.0).contains(&score.score) {
                return Err(ClassificationError::InvalidResponse(format!(
                    "score {} for {:?} is outside [0, 1]",
                    score.score, score.label
                )));
            }
        }
        if seen.len() != self.config.candidates.len() {
            return Err(ClassificationError::InvalidResponse(format!(
                "expected {} topic scores, got {}",
                self.config.candidates.len(),
                seen.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convo_classify::MockTopicClassifier;
    use convo_types::ConversationId;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn conversation(messages: Vec<Message>) -> Conversation {
        Conversation::new(ConversationId::from(42_i64), messages)
    }

    fn human(text: &str, ts: &str) -> Message {
        Message::new(7, Some("alice".into()), text, ts)
    }

    fn operator(text: &str) -> Message {
        Message::new(DEFAULT_OPERATOR_ID, Some("operator".into()), text, "t0")
    }

    fn bucketer(classifier: MockTopicClassifier, names: &[&str], threshold: f64) -> TopicBucketer {
        TopicBucketer::new(
            Arc::new(classifier),
            BucketerConfig::new(topics(names), threshold).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_groups_hits_by_topic() {
        let classifier = MockTopicClassifier::new()
            .with_score("I love this app", "app_usability", 0.9)
            .with_score("crashes constantly", "app_usability", 0.9);
        let bucketer = bucketer(classifier, &["app_usability"], 0.5);

        let bucket = bucketer
            .extract_topics(&conversation(vec![
                human("I love this app", "t1"),
                human("crashes constantly", "t2"),
            ]))
            .await
            .unwrap();

        assert_eq!(bucket.len(), 1);
        let hits = &bucket["app_usability"];
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], TopicHit::new("t1", "I love this app", 0.9));
        assert_eq!(hits[1], TopicHit::new("t2", "crashes constantly", 0.9));
    }

    #[tokio::test]
    async fn test_multi_label_and_threshold() {
        let classifier = MockTopicClassifier::new()
            .with_default_score(0.1)
            .with_score("walking with my daughter", "family_relationships", 0.82)
            .with_score("walking with my daughter", "fitness_and_motivation", 0.71)
            .with_score("walking with my daughter", "life_purpose", 0.69);
        let bucketer = bucketer(
            classifier,
            &["family_relationships", "fitness_and_motivation", "life_purpose"],
            0.7,
        );

        let bucket = bucketer
            .extract_topics(&conversation(vec![human("walking with my daughter", "t1")]))
            .await
            .unwrap();

        let found: Vec<&str> = bucket.keys().map(String::as_str).collect();
        assert_eq!(found, vec!["family_relationships", "fitness_and_motivation"]);
        for hits in bucket.values() {
            assert!(hits.iter().all(|h| h.relevance_score >= 0.7));
        }
    }

    #[tokio::test]
    async fn test_rounded_score_never_falls_below_threshold() {
        let classifier = MockTopicClassifier::new().with_score("hello", "social_support", 0.70049);
        let bucketer = bucketer(classifier, &["social_support"], 0.7004);

        let bucket = bucketer
            .extract_topics(&conversation(vec![human("hello", "t1")]))
            .await
            .unwrap();
        assert!(bucket.is_empty());
    }

    #[tokio::test]
    async fn test_skips_operator_and_blank_messages() {
        let classifier = Arc::new(MockTopicClassifier::new().with_default_score(0.9));
        let bucketer = TopicBucketer::new(
            classifier.clone(),
            BucketerConfig::new(topics(&["app_usability"]), 0.5).unwrap(),
        );

        let bucket = bucketer
            .extract_topics(&conversation(vec![
                operator("How is the app?"),
                human("   ", "t1"),
                human("  pretty good  ", "t2"),
            ]))
            .await
            .unwrap();

        assert_eq!(classifier.seen_texts(), vec!["pretty good"]);
        assert_eq!(bucket["app_usability"][0].message, "pretty good");
    }

    #[tokio::test]
    async fn test_no_hits_gives_empty_bucket() {
        let bucketer = bucketer(MockTopicClassifier::new(), &["life_purpose"], 0.7);
        let bucket = bucketer
            .extract_topics(&conversation(vec![human("ok", "t1")]))
            .await
            .unwrap();
        assert!(bucket.is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_fails_segment() {
        let classifier = MockTopicClassifier::new()
            .with_default_score(0.9)
            .failing_on("boom");
        let bucketer = bucketer(classifier, &["app_usability"], 0.5);

        let result = bucketer
            .extract_topics(&conversation(vec![human("fine", "t1"), human("boom", "t2")]))
            .await;
        assert!(matches!(result, Err(PipelineError::Classification(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_classification_error() {
        let classifier = MockTopicClassifier::new().with_delay(Duration::from_secs(60));
        let bucketer = TopicBucketer::new(
            Arc::new(classifier),
            BucketerConfig::new(topics(&["app_usability"]), 0.5)
                .unwrap()
                .with_timeout(Duration::from_millis(100)),
        );

        let result = bucketer
            .extract_topics(&conversation(vec![human("slow", "t1")]))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Classification(ClassificationError::Timeout(_)))
        ));
    }

    struct OffListClassifier;

    #[async_trait]
    impl TopicClassifier for OffListClassifier {
        async fn classify(
            &self,
            _text: &str,
            _labels: &[String],
        ) -> Result<Vec<TopicScore>, ClassificationError> {
            Ok(vec![TopicScore::new("weather", 0.99)])
        }
    }

    #[tokio::test]
    async fn test_unknown_label_rejected() {
        let bucketer = TopicBucketer::new(
            Arc::new(OffListClassifier),
            BucketerConfig::new(topics(&["app_usability"]), 0.5).unwrap(),
        );
        let result = bucketer
            .extract_topics(&conversation(vec![human("sunny", "t1")]))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Classification(ClassificationError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn test_hit_order_follows_messages_under_concurrency() {
        let classifier = MockTopicClassifier::new()
            .with_default_score(0.9)
            .with_delay(Duration::from_millis(5));
        let bucketer = TopicBucketer::new(
            Arc::new(classifier),
            BucketerConfig::new(topics(&["app_usability"]), 0.5)
                .unwrap()
                .with_concurrency(8),
        );
        let messages: Vec<Message> = (0..10)
            .map(|i| human(&format!("message {}", i), &format!("t{}", i)))
            .collect();

        let bucket = bucketer.extract_topics(&conversation(messages)).await.unwrap();
        let order: Vec<&str> = bucket["app_usability"]
            .iter()
            .map(|h| h.timestamp.as_str().unwrap_or_default())
            .collect();
        assert_eq!(order, (0..10).map(|i| format!("t{}", i)).collect::<Vec<_>>());
    }

    #[test]
    fn test_config_validation() {
        assert!(BucketerConfig::new(topics(&["a"]), 1.5).is_err());
        assert!(BucketerConfig::new(topics(&["a"]), -0.1).is_err());
        assert!(BucketerConfig::new(topics(&[" ", ""]), 0.5).is_err());

        let config = BucketerConfig::new(topics(&[" a ", "b", "a"]), 0.5).unwrap();
        assert_eq!(config.candidates(), &["a".to_string(), "b".to_string()]);
    }
}
