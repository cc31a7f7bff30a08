//! Per-topic sentiment aggregation.
//!
//! For each topic of a segment, the most relevant hits are scored for
//! sentiment and summarised by majority vote.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use convo_classify::{with_timeout, ClassificationError, SentimentClassifier, SentimentScore};
use convo_types::{
    round_score, ScoredMessage, SentimentRecord, SentimentSummary, Settings, TopicBucket, TopicHit,
};

use crate::error::PipelineError;

/// Configuration for sentiment aggregation.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    min_score: f64,
    max_per_topic: Option<usize>,
    concurrency: usize,
    timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            max_per_topic: Some(3),
            concurrency: 4,
            timeout: Duration::from_secs(90),
        }
    }
}

impl AggregatorConfig {
    /// Create a config. `max_per_topic` of `None` means no cap.
    pub fn new(min_score: f64, max_per_topic: Option<usize>) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&min_score) {
            return Err(PipelineError::InvalidInput(format!(
                "min_score must be within [0, 1], got {}",
                min_score
            )));
        }
        if max_per_topic == Some(0) {
            return Err(PipelineError::InvalidInput(
                "max_per_topic must be positive or unbounded".to_string(),
            ));
        }
        Ok(Self {
            min_score,
            max_per_topic,
            ..Self::default()
        })
    }

    /// Build from loaded settings; a stored cap of 0 means unbounded.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        Ok(Self::new(settings.sentiment.min_score, settings.sentiment.cap())?
            .with_concurrency(settings.sentiment.concurrency)
            .with_timeout(settings.sentiment.timeout()))
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

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn max_per_topic(&self) -> Option<usize> {
        self.max_per_topic
    }
}

/// Keep hits with `relevance_score >= min_score`, most relevant first, at most `cap`.
///
/// Equal scores keep their input order.
pub fn select_hits(hits: &[TopicHit], min_score: f64, cap: Option<usize>) -> Vec<&TopicHit> {
    let mut selected: Vec<&TopicHit> = hits
        .iter()
        .filter(|h| h.relevance_score >= min_score)
        .collect();
    selected.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    if let Some(cap) = cap {
        selected.truncate(cap);
    }
    selected
}

/// Scores topic hits with a [`SentimentClassifier`] and votes per topic.
pub struct SentimentAggregator {
    classifier: Arc<dyn SentimentClassifier>,
    config: AggregatorConfig,
}

impl SentimentAggregator {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, config: AggregatorConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregate sentiment for every topic of one segment.
    ///
    /// Topics with no hit above `min_score` are omitted. An empty result
    /// means the segment has nothing to report. Any classifier failure fails
    /// the whole segment.
    pub async fn aggregate(&self, bucket: &TopicBucket) -> Result<SentimentSummary, PipelineError> {
        let work: Vec<(&String, &TopicHit)> = bucket
            .iter()
            .flat_map(|(topic, hits)| {
                select_hits(hits, self.config.min_score, self.config.max_per_topic)
                    .into_iter()
                    .map(move |hit| (topic, hit))
            })
            .collect();

        let classifier = &self.classifier;
        let timeout = self.config.timeout;

        let scores: Vec<SentimentScore> = stream::iter(work.iter().map(|(topic, hit)| {
            let text = hit.message.as_str();
            async move {
                debug!(topic = %topic, chars = text.len(), "Classifying sentiment");
                with_timeout(timeout, classifier.classify(text)).await
            }
        }))
        .buffered(self.config.concurrency)
        .try_collect()
        .await?;

        let mut scored: BTreeMap<String, Vec<ScoredMessage>> = BTreeMap::new();
        for ((topic, hit), score) in work.into_iter().zip(scores) {
            if !(0.0..=1.0).contains(&score.score) {
                return Err(ClassificationError::InvalidResponse(format!(
                    "sentiment score {} is outside [0, 1]",
                    score.score
                ))
                .into());
            }
            scored.entry(topic.clone()).or_default().push(ScoredMessage {
                timestamp: hit.timestamp.clone(),
                message: hit.message.clone(),
                sentiment: score.label,
                sentiment_score: round_score(score.score),
                relevance_score: hit.relevance_score,
            });
        }

        Ok(scored
            .into_iter()
            .map(|(topic, messages)| (topic, SentimentRecord::from_messages(messages)))
            .collect())
    }
}
