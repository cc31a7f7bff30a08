//! Configuration loading for the conversation sentiment pipeline.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! Default config file lives at ~/.config/convo-sentiment/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::conversation::DEFAULT_OPERATOR_ID;
use crate::error::ConvoError;

/// How the segmenter names outputs across runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// `{screen_name}_{conversation_id}`; a later run overwrites an earlier one
    #[default]
    Overwrite,
    /// Run id appended to the base key so runs never collide
    RunScoped,
}

/// Segmenter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmenterSettings {
    #[serde(default)]
    pub key_policy: KeyPolicy,
}

/// Topic bucketing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSettings {
    /// Candidate topic labels offered to the classifier
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,

    /// Minimum classifier score for a topic hit (0.0-1.0)
    #[serde(default = "default_topic_threshold")]
    pub threshold: f64,

    /// Concurrent classifier calls per segment
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout (ms)
    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_candidates() -> Vec<String> {
    [
        "app_usability",
        "technical_support",
        "physical_health",
        "emotional_wellbeing",
        "family_relationships",
        "social_support",
        "virtual_socializing",
        "hobbies_and_interests",
        "fitness_and_motivation",
        "mindfulness_and_gratitude",
        "life_purpose",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_topic_threshold() -> f64 {
    0.7
}

fn default_concurrency() -> usize {
    4
}

fn default_call_timeout_ms() -> u64 {
    90_000
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            threshold: default_topic_threshold(),
            concurrency: default_concurrency(),
            timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl TopicSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sentiment aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSettings {
    /// Minimum topic relevance for a hit to be scored (0.0-1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Hits scored per topic; 0 means unbounded
    #[serde(default = "default_max_per_topic")]
    pub max_per_topic: usize,

    /// Concurrent classifier calls per segment
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout (ms)
    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_min_score() -> f64 {
    0.5
}

fn default_max_per_topic() -> usize {
    3
}

impl Default for SentimentSettings {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_per_topic: default_max_per_topic(),
            concurrency: default_concurrency(),
            timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl SentimentSettings {
    /// Per-topic cap, `None` when unbounded.
    pub fn cap(&self) -> Option<usize> {
        (self.max_per_topic > 0).then_some(self.max_per_topic)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which classifier backend to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierProvider {
    /// Hosted inference API
    #[default]
    Huggingface,
    /// Deterministic offline classifiers
    Mock,
}

/// Classifier backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default)]
    pub provider: ClassifierProvider,

    /// Inference API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Zero-shot multi-label topic model
    #[serde(default = "default_topic_model")]
    pub topic_model: String,

    /// Binary sentiment model
    #[serde(default = "default_sentiment_model")]
    pub sentiment_model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Maximum attempts per call, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}

fn default_topic_model() -> String {
    "facebook/bart-large-mnli".to_string()
}

fn default_sentiment_model() -> String {
    "distilbert-base-uncased-finetuned-sst-2-english".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            provider: ClassifierProvider::default(),
            base_url: default_base_url(),
            topic_model: default_topic_model(),
            sentiment_model: default_sentiment_model(),
            api_key: None,
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// First delay before retrying a failed inference call (ms)
pub const RETRY_INITIAL_BACKOFF_MS: u64 = 500;

/// Growth factor between successive retry delays
pub const RETRY_MULTIPLIER: f64 = 1.5;

/// Jitter applied to each retry delay, as a fraction of the delay
pub const RETRY_RANDOMIZATION: f64 = 0.5;

/// Upper bound on a single retry delay (ms)
pub const RETRY_MAX_INTERVAL_MS: u64 = 60_000;

impl ClassifierSettings {
    /// Worst-case time one inference call can take: every attempt running
    /// into the request timeout plus the longest jittered delay before each
    /// retry.
    pub fn retry_budget(&self) -> Duration {
        let attempts = u64::from(self.max_retries);
        let mut total_ms = self
            .request_timeout_secs
            .saturating_mul(1000)
            .saturating_mul(attempts);
        let mut interval_ms = RETRY_INITIAL_BACKOFF_MS as f64;
        for _ in 1..attempts {
            let delay_ms = (interval_ms * (1.0 + RETRY_RANDOMIZATION)).ceil() as u64;
            total_ms = total_ms.saturating_add(delay_ms);
            interval_ms = (interval_ms * RETRY_MULTIPLIER).min(RETRY_MAX_INTERVAL_MS as f64);
        }
        Duration::from_millis(total_ms)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base directory holding the per-stage output directories
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Sender id reserved for the operator
    #[serde(default = "default_operator_id")]
    pub operator_id: i64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub segmenter: SegmenterSettings,

    #[serde(default)]
    pub topics: TopicSettings,

    #[serde(default)]
    pub sentiment: SentimentSettings,

    #[serde(default)]
    pub classifier: ClassifierSettings,
}

fn default_output_dir() -> String {
    "Output".to_string()
}

fn default_operator_id() -> i64 {
    DEFAULT_OPERATOR_ID
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            operator_id: default_operator_id(),
            log_level: default_log_level(),
            segmenter: SegmenterSettings::default(),
            topics: TopicSettings::default(),
            sentiment: SentimentSettings::default(),
            classifier: ClassifierSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/convo-sentiment/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (CONVO_*, `__` between nested keys)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConvoError> {
        let config_dir = ProjectDirs::from("", "", "convo-sentiment")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("output_dir", default_output_dir())
            .map_err(|e| ConvoError::Config(e.to_string()))?
            .set_default("operator_id", default_operator_id())
            .map_err(|e| ConvoError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ConvoError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CONVO_OUTPUT_DIR, CONVO_TOPICS__THRESHOLD, CONVO_CLASSIFIER__API_KEY, ...
        builder = builder.add_source(
            Environment::with_prefix("CONVO")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("topics.candidates")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConvoError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConvoError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConvoError> {
        if !(0.0..=1.0).contains(&self.topics.threshold) {
            return Err(ConvoError::Config(format!(
                "topics.threshold must be 0.0-1.0, got {}",
                self.topics.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.sentiment.min_score) {
            return Err(ConvoError::Config(format!(
                "sentiment.min_score must be 0.0-1.0, got {}",
                self.sentiment.min_score
            )));
        }
        if self.topics.candidates.iter().all(|t| t.trim().is_empty()) {
            return Err(ConvoError::Config(
                "topics.candidates must name at least one topic".to_string(),
            ));
        }
        if self.topics.concurrency == 0 || self.sentiment.concurrency == 0 {
            return Err(ConvoError::Config("concurrency must be > 0".to_string()));
        }
        if self.topics.timeout_ms == 0 || self.sentiment.timeout_ms == 0 {
            return Err(ConvoError::Config("timeout_ms must be > 0".to_string()));
        }
        if self.classifier.max_retries == 0 {
            return Err(ConvoError::Config(
                "classifier.max_retries must be >= 1".to_string(),
            ));
        }
        if self.classifier.request_timeout_secs == 0 {
            return Err(ConvoError::Config(
                "classifier.request_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.classifier.provider == ClassifierProvider::Huggingface {
            let budget = self.classifier.retry_budget();
            for (section, timeout_ms) in [
                ("topics", self.topics.timeout_ms),
                ("sentiment", self.sentiment.timeout_ms),
            ] {
                if Duration::from_millis(timeout_ms) < budget {
                    return Err(ConvoError::Config(format!(
                        "{}.timeout_ms ({}) is shorter than the classifier retry budget ({} ms); \
                         raise it or lower classifier.request_timeout_secs / max_retries",
                        section,
                        timeout_ms,
                        budget.as_millis()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse a comma-separated topic list, dropping blanks and duplicates.
    pub fn parse_topic_list(raw: &str) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !topics.iter().any(|t| t == topic) {
                topics.push(topic.to_string());
            }
        }
        topics
    }
}
