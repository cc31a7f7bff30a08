//! Classifier capabilities consumed by the pipeline.
//!
//! Provides:
//! - `TopicClassifier`: multi-label zero-shot topic scoring
//! - `SentimentClassifier`: binary POSITIVE/NEGATIVE scoring
//! - HTTP inference-API implementations with configurable retry
//! - Deterministic mock implementations for dry runs and tests
//! - A per-call timeout wrapper

mod api;
mod classifier;
mod error;
mod mock;
mod provider;

pub use api::{ApiSentimentClassifier, ApiTopicClassifier, InferenceApiConfig};
pub use classifier::{with_timeout, SentimentClassifier, SentimentScore, TopicClassifier, TopicScore};
pub use error::ClassificationError;
pub use mock::{MockSentimentClassifier, MockTopicClassifier};
pub use provider::{from_settings, Classifiers};
