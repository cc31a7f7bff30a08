//! Mock classifiers for dry runs and testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use convo_types::SentimentLabel;

use crate::classifier::{SentimentClassifier, SentimentScore, TopicClassifier, TopicScore};
use crate::error::ClassificationError;

/// Mock topic classifier that generates deterministic scores.
///
/// Scores come from, in order: scripted `(text, label)` pairs, a keyword
/// match of the label's words against the text, then the default score.
pub struct MockTopicClassifier {
    scripted: HashMap<(String, String), f64>,
    keyword_score: f64,
    default_score: f64,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockTopicClassifier {
    /// Create a new mock classifier.
    pub fn new() -> Self {
        Self {
            scripted: HashMap::new(),
            keyword_score: 0.9,
            default_score: 0.05,
            fail_on: Vec::new(),
            delay: None,
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fix the score of `label` for `text`.
    pub fn with_score(mut self, text: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        self.scripted.insert((text.into(), label.into()), score);
        self
    }

    /// Score used for labels that are neither scripted nor keyword-matched.
    pub fn with_default_score(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    /// Fail any call whose text contains `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of classify calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts passed to classify, in call order.
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn score(&self, text: &str, label: &str) -> f64 {
        if let Some(score) = self.scripted.get(&(text.to_string(), label.to_string())) {
            return *score;
        }
        let lowered = text.to_lowercase();
        let matched = label
            .split(['_', ' '])
            .filter(|w| w.len() > 3)
            .any(|w| lowered.contains(&w.to_lowercase()));
        if matched {
            self.keyword_score
        } else {
            self.default_score
        }
    }
}

impl Default for MockTopicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicClassifier for MockTopicClassifier {
    async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<Vec<TopicScore>, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.iter().any(|n| text.contains(n.as_str())) {
            return Err(ClassificationError::Unavailable(format!(
                "mock failure for {:?}",
                text
            )));
        }

        Ok(labels
            .iter()
            .map(|label| TopicScore::new(label.clone(), self.score(text, label)))
            .collect())
    }
}

const NEGATIVE_WORDS: &[&str] = &[
    "crash", "bug", "broken", "hate", "slow", "sad", "lonely", "tired", "pain", "worse",
    "bad", "never", "can't", "cannot", "frustrat", "angry", "annoy",
];

/// Mock sentiment classifier with scripted answers and a small lexicon fallback.
pub struct MockSentimentClassifier {
    scripted: HashMap<String, SentimentScore>,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockSentimentClassifier {
    /// Create a new mock classifier.
    pub fn new() -> Self {
        Self {
            scripted: HashMap::new(),
            fail_on: Vec::new(),
            delay: None,
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fix the answer for `text`.
    pub fn with_result(mut self, text: impl Into<String>, label: SentimentLabel, score: f64) -> Self {
        self.scripted.insert(text.into(), SentimentScore::new(label, score));
        self
    }

    /// Fail any call whose text contains `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of classify calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts passed to classify, in call order.
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn lexicon(text: &str) -> SentimentScore {
        let lowered = text.to_lowercase();
        let hits = NEGATIVE_WORDS.iter().filter(|w| lowered.contains(*w)).count();
        if hits > 0 {
            SentimentScore::new(SentimentLabel::Negative, (0.7 + 0.1 * hits as f64).min(0.99))
        } else {
            SentimentScore::new(SentimentLabel::Positive, 0.8)
        }
    }
}

impl Default for MockSentimentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentClassifier for MockSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<SentimentScore, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.iter().any(|n| text.contains(n.as_str())) {
            return Err(ClassificationError::Unavailable(format!(
                "mock failure for {:?}",
                text
            )));
        }

        Ok(self
            .scripted
            .get(text)
            .copied()
            .unwrap_or_else(|| Self::lexicon(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_topic_scripted_and_default() {
        let classifier = MockTopicClassifier::new()
            .with_score("I love this app", "app_usability", 0.9)
            .with_default_score(0.1);

        let scores = classifier
            .classify("I love this app", &labels(&["app_usability", "life_purpose"]))
            .await
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], TopicScore::new("app_usability", 0.9));
        assert_eq!(scores[1], TopicScore::new("life_purpose", 0.1));
        assert_eq!(classifier.call_count(), 1);
        assert_eq!(classifier.seen_texts(), vec!["I love this app"]);
    }

    #[tokio::test]
    async fn test_topic_keyword_match() {
        let classifier = MockTopicClassifier::new();
        let scores = classifier
            .classify("My family visited today", &labels(&["family_relationships", "fitness_and_motivation"]))
            .await
            .unwrap();
        assert!((scores[0].score - 0.9).abs() < f64::EPSILON);
        assert!((scores[1].score - 0.05).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_topic_failure() {
        let classifier = MockTopicClassifier::new().failing_on("boom");
        let result = classifier.classify("boom goes the model", &labels(&["a"])).await;
        assert!(matches!(result, Err(ClassificationError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_sentiment_scripted_and_lexicon() {
        let classifier = MockSentimentClassifier::new().with_result(
            "I love this app",
            SentimentLabel::Positive,
            0.95,
        );

        let scripted = classifier.classify("I love this app").await.unwrap();
        assert_eq!(scripted, SentimentScore::new(SentimentLabel::Positive, 0.95));

        let lexicon = classifier.classify("it crashes constantly").await.unwrap();
        assert_eq!(lexicon.label, SentimentLabel::Negative);

        let neutral = classifier.classify("going for a walk").await.unwrap();
        assert_eq!(neutral.label, SentimentLabel::Positive);
        assert_eq!(classifier.call_count(), 3);
    }

    #[tokio::test]
    async fn test_sentiment_failure() {
        let classifier = MockSentimentClassifier::new().failing_on("explode");
        assert!(classifier.classify("please explode").await.is_err());
        assert!(classifier.classify("fine").await.is_ok());
    }
}
