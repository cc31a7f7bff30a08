//! Conversation sentiment pipeline
//!
//! Turns raw conversation logs into per-topic sentiment reports.
//!
//! # Usage
//!
//! ```bash
//! convo-pipeline run --input logs/ [--topics a,b] [--threshold 0.7]
//! convo-pipeline segment --input logs/
//! convo-pipeline topics | sentiment | reports
//! convo-pipeline config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/convo-sentiment/config.toml)
//! 3. Environment variables (CONVO_*)
//! 4. CLI flags

use std::process::ExitCode;

use clap::Parser;

use convo_cli::{handle_command, render_error, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match handle_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&e));
            ExitCode::FAILURE
        }
    }
}
