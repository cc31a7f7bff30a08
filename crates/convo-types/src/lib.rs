//! # convo-types
//!
//! Shared domain types for the conversation sentiment pipeline.
//!
//! This crate defines the data structures passed between pipeline stages:
//! - Conversations and messages as ingested from raw logs
//! - Topic hits and per-segment topic buckets
//! - Per-topic sentiment records and overall reports
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use convo_types::{Conversation, SentimentLabel};
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod sentiment;
pub mod topic;

pub use config::{
    ClassifierProvider, ClassifierSettings, KeyPolicy, SegmenterSettings, SentimentSettings,
    Settings, TopicSettings, RETRY_INITIAL_BACKOFF_MS, RETRY_MAX_INTERVAL_MS, RETRY_MULTIPLIER,
    RETRY_RANDOMIZATION,
};
pub use conversation::{
    Conversation, ConversationId, Message, SegmentKey, SenderRole, DEFAULT_OPERATOR_ID,
};
pub use error::ConvoError;
pub use sentiment::{
    majority_label, OverallReport, ScoredMessage, SentimentLabel, SentimentRecord,
    SentimentSummary,
};
pub use topic::{round_score, TopicBucket, TopicHit};
