//! Conversation pipeline CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, single stages, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, SentimentArgs, TopicArgs};
pub use commands::{
    apply_sentiment_overrides, apply_topic_overrides, expand_path, handle_command, open_pipeline,
    render_config, render_error,
};
