//! Classifiers backed by a hosted inference API.
//!
//! Requests follow the Hugging Face inference API: a POST of
//! `{"inputs": ..., "parameters": ...}` to `{base_url}/models/{model}`.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use convo_types::{
    SentimentLabel, RETRY_INITIAL_BACKOFF_MS, RETRY_MAX_INTERVAL_MS, RETRY_MULTIPLIER,
    RETRY_RANDOMIZATION,
};

use crate::classifier::{SentimentClassifier, SentimentScore, TopicClassifier, TopicScore};
use crate::error::ClassificationError;

/// Configuration for one inference model endpoint.
#[derive(Debug, Clone)]
pub struct InferenceApiConfig {
    /// API base URL (e.g., "https://api-inference.huggingface.co")
    pub base_url: String,

    /// Model to use (e.g., "facebook/bart-large-mnli")
    pub model: String,

    /// API key, sent as a bearer token when present
    pub api_key: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum attempts per call, including the first
    pub max_retries: u32,

    /// First backoff delay between attempts
    pub initial_backoff: Duration,
}

impl InferenceApiConfig {
    /// Create config for a model on the given base URL.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(20),
            max_retries: 3,
            initial_backoff: Duration::from_millis(RETRY_INITIAL_BACKOFF_MS),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }
}

/// HTTP client for one model endpoint, with retry.
struct InferenceClient {
    client: Client,
    config: InferenceApiConfig,
}

impl InferenceClient {
    fn new(config: InferenceApiConfig) -> Result<Self, ClassificationError> {
        if config.max_retries == 0 {
            return Err(ClassificationError::ConfigError(
                "max_retries must be >= 1".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassificationError::ConfigError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Call the API with retry logic.
    async fn call_api<B: Serialize + Sync>(&self, body: &B) -> Result<Value, ClassificationError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            current_interval: self.config.initial_backoff,
            multiplier: RETRY_MULTIPLIER,
            randomization_factor: RETRY_RANDOMIZATION,
            max_interval: Duration::from_millis(RETRY_MAX_INTERVAL_MS),
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(model = %self.config.model, attempt = attempts, "Calling inference API");

            match self.make_request(body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() || attempts >= self.config.max_retries {
                        error!(model = %self.config.model, error = %e, attempts, "Inference call failed");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Inference call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Make a single API request.
    async fn make_request<B: Serialize + Sync>(&self, body: &B) -> Result<Value, ClassificationError> {
        let mut request = self
            .client
            .post(self.config.endpoint())
            .header("Content-Type", "application/json")
            .json(body);

        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassificationError::Timeout(self.config.timeout)
            } else {
                ClassificationError::ApiError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassificationError::RateLimitExceeded);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::Unavailable(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ClassificationError::ParseError(e.to_string()))
    }
}

#[derive(Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters<'a>,
}

#[derive(Serialize)]
struct ZeroShotParameters<'a> {
    candidate_labels: &'a [String],
    multi_label: bool,
}

#[derive(Deserialize, Debug)]
struct LabelScore {
    label: String,
    score: f64,
}

/// Zero-shot responses come either as parallel arrays or as a list of pairs.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ZeroShotResponse {
    Parallel { labels: Vec<String>, scores: Vec<f64> },
    Pairs(Vec<LabelScore>),
}

fn parse_topic_scores(value: Value) -> Result<Vec<TopicScore>, ClassificationError> {
    let response: ZeroShotResponse = serde_json::from_value(value)
        .map_err(|e| ClassificationError::ParseError(format!("zero-shot response: {}", e)))?;

    match response {
        ZeroShotResponse::Parallel { labels, scores } => {
            if labels.len() != scores.len() {
                return Err(ClassificationError::InvalidResponse(format!(
                    "{} labels but {} scores",
                    labels.len(),
                    scores.len()
                )));
            }
            Ok(labels
                .into_iter()
                .zip(scores)
                .map(|(label, score)| TopicScore::new(label, score))
                .collect())
        }
        ZeroShotResponse::Pairs(pairs) => Ok(pairs
            .into_iter()
            .map(|p| TopicScore::new(p.label, p.score))
            .collect()),
    }
}

/// Sentiment responses are a flat or singly-nested list of label scores.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum SentimentResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

fn parse_sentiment(value: Value) -> Result<SentimentScore, ClassificationError> {
    let response: SentimentResponse = serde_json::from_value(value)
        .map_err(|e| ClassificationError::ParseError(format!("sentiment response: {}", e)))?;

    let candidates = match response {
        SentimentResponse::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
        SentimentResponse::Flat(flat) => flat,
    };

    let best = candidates
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| ClassificationError::InvalidResponse("no sentiment labels".to_string()))?;

    let label: SentimentLabel = best
        .label
        .parse()
        .map_err(|e: convo_types::ConvoError| ClassificationError::InvalidResponse(e.to_string()))?;

    Ok(SentimentScore::new(label, best.score))
}

/// Topic classifier calling a zero-shot classification model.
pub struct ApiTopicClassifier {
    inner: InferenceClient,
}

impl ApiTopicClassifier {
    pub fn new(config: InferenceApiConfig) -> Result<Self, ClassificationError> {
        Ok(Self {
            inner: InferenceClient::new(config)?,
        })
    }
}

#[async_trait]
impl TopicClassifier for ApiTopicClassifier {
    async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<Vec<TopicScore>, ClassificationError> {
        let request = ZeroShotRequest {
            inputs: text,
            parameters: ZeroShotParameters {
                candidate_labels: labels,
                multi_label: true,
            },
        };
        let response = self.inner.call_api(&request).await?;
        parse_topic_scores(response)
    }
}

/// Sentiment classifier calling a text-classification model.
pub struct ApiSentimentClassifier {
    inner: InferenceClient,
}

impl ApiSentimentClassifier {
    pub fn new(config: InferenceApiConfig) -> Result<Self, ClassificationError> {
        Ok(Self {
            inner: InferenceClient::new(config)?,
        })
    }
}

#[async_trait]
impl SentimentClassifier for ApiSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<SentimentScore, ClassificationError> {
        #[derive(Serialize)]
        struct TextRequest<'a> {
            inputs: &'a str,
        }

        let response = self.inner.call_api(&TextRequest { inputs: text }).await?;
        parse_sentiment(response)
    }
}
