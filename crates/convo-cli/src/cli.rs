//! CLI argument parsing for the conversation pipeline.
//!
//! Flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Conversation sentiment pipeline
///
/// Segments raw conversation logs, buckets messages by topic and reports
/// per-topic sentiment.
#[derive(Parser, Debug)]
#[command(name = "convo-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/convo-sentiment/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Output base directory holding Data/, Topics/, Sentiment/ and Reports/
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Use the offline mock classifiers instead of the inference API
    #[arg(long, global = true)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Pipeline commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run all stages on an input file or directory
    Run {
        /// Conversation JSON file, or a directory of them
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        topics: TopicArgs,

        #[command(flatten)]
        sentiment: SentimentArgs,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Segment conversations into the Data store
    Segment {
        /// Conversation JSON file, or a directory of them
        #[arg(short, long)]
        input: String,
    },

    /// Bucket stored segments by topic
    Topics {
        #[command(flatten)]
        topics: TopicArgs,
    },

    /// Aggregate sentiment for stored topic buckets
    Sentiment {
        #[command(flatten)]
        sentiment: SentimentArgs,
    },

    /// Build overall reports from stored sentiment records
    Reports,

    /// Print the effective configuration as TOML
    Config,
}

/// Topic bucketing overrides
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TopicArgs {
    /// Comma-separated candidate topics
    #[arg(short, long)]
    pub topics: Option<String>,

    /// Minimum topic score for a hit (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Sentiment aggregation overrides
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SentimentArgs {
    /// Minimum topic relevance for a hit to be scored (0.0-1.0)
    #[arg(long)]
    pub min_score: Option<f64>,

    /// Hits scored per topic; 0 for no limit
    #[arg(long)]
    pub max_per_topic: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run() {
        let cli = Cli::parse_from([
            "convo-pipeline",
            "run",
            "--input",
            "logs/",
            "--topics",
            "app_usability,life_purpose",
            "--threshold",
            "0.6",
        ]);
        match cli.command {
            Commands::Run { input, topics, sentiment, json } => {
                assert_eq!(input, "logs/");
                assert_eq!(topics.topics.as_deref(), Some("app_usability,life_purpose"));
                assert_eq!(topics.threshold, Some(0.6));
                assert!(sentiment.min_score.is_none());
                assert!(!json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "convo-pipeline",
            "reports",
            "--output",
            "/tmp/out",
            "--log-level",
            "debug",
            "--mock",
        ]);
        assert!(matches!(cli.command, Commands::Reports));
        assert_eq!(cli.output, Some("/tmp/out".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(cli.mock);
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["convo-pipeline", "--config", "/path/to/config.toml", "config"]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_cli_sentiment() {
        let cli = Cli::parse_from([
            "convo-pipeline",
            "sentiment",
            "--min-score",
            "0.4",
            "--max-per-topic",
            "0",
        ]);
        match cli.command {
            Commands::Sentiment { sentiment } => {
                assert_eq!(sentiment.min_score, Some(0.4));
                assert_eq!(sentiment.max_per_topic, Some(0));
            }
            _ => panic!("Expected Sentiment command"),
        }
    }

    #[test]
    fn test_cli_segment_requires_input() {
        assert!(Cli::try_parse_from(["convo-pipeline", "segment"]).is_err());
        let cli = Cli::parse_from(["convo-pipeline", "segment", "-i", "in.json"]);
        assert!(matches!(cli.command, Commands::Segment { input } if input == "in.json"));
    }
}
