//! Command implementations.
//!
//! Each stage command opens the stage stores under the output directory and
//! runs against their current contents, so any stage can be re-run alone.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tracing::{info, warn};

use convo_classify::{from_settings, ClassificationError};
use convo_pipeline::{ErrorKind, Pipeline, PipelineConfig, PipelineError, RunSummary, StageReport};
use convo_storage::{ConversationSource, PathSource, StageStores, StorageError};
use convo_types::{ClassifierProvider, ConvoError, Settings};

use crate::cli::{Cli, Commands, SentimentArgs, TopicArgs};

/// Execute a parsed command line.
pub async fn handle_command(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_global_overrides(&mut settings, &cli);

    match cli.command {
        Commands::Config => {
            print!("{}", render_config(&settings)?);
            return Ok(());
        }
        Commands::Run {
            input,
            topics,
            sentiment,
            json,
        } => {
            apply_topic_overrides(&mut settings, &topics);
            apply_sentiment_overrides(&mut settings, &sentiment);
            settings.validate()?;
            init_logging(&settings.log_level)?;

            let pipeline = open_pipeline(&settings)?;
            let batch = PathSource::new(expand_path(&input)?)
                .load()
                .map_err(PipelineError::from)?;
            let summary = interruptible(pipeline.run(batch)).await??;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Segment { input } => {
            settings.validate()?;
            init_logging(&settings.log_level)?;

            let pipeline = open_pipeline(&settings)?;
            let batch = PathSource::new(expand_path(&input)?)
                .load()
                .map_err(PipelineError::from)?;
            print_stage(&pipeline.segment(batch));
        }
        Commands::Topics { topics } => {
            apply_topic_overrides(&mut settings, &topics);
            settings.validate()?;
            init_logging(&settings.log_level)?;

            let pipeline = open_pipeline(&settings)?;
            print_stage(&interruptible(pipeline.bucket_topics()).await??);
        }
        Commands::Sentiment { sentiment } => {
            apply_sentiment_overrides(&mut settings, &sentiment);
            settings.validate()?;
            init_logging(&settings.log_level)?;

            let pipeline = open_pipeline(&settings)?;
            print_stage(&interruptible(pipeline.aggregate_sentiment()).await??);
        }
        Commands::Reports => {
            settings.validate()?;
            init_logging(&settings.log_level)?;

            let pipeline = open_pipeline(&settings)?;
            print_stage(&pipeline.build_reports()?);
        }
    }

    Ok(())
}

fn apply_global_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(output) = &cli.output {
        settings.output_dir = output.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if cli.mock {
        settings.classifier.provider = ClassifierProvider::Mock;
    }
}

/// Apply topic flags to loaded settings.
pub fn apply_topic_overrides(settings: &mut Settings, args: &TopicArgs) {
    if let Some(raw) = &args.topics {
        settings.topics.candidates = Settings::parse_topic_list(raw);
    }
    if let Some(threshold) = args.threshold {
        settings.topics.threshold = threshold;
    }
}

/// Apply sentiment flags to loaded settings.
pub fn apply_sentiment_overrides(settings: &mut Settings, args: &SentimentArgs) {
    if let Some(min_score) = args.min_score {
        settings.sentiment.min_score = min_score;
    }
    if let Some(max) = args.max_per_topic {
        settings.sentiment.max_per_topic = max;
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Expand `~` and environment variables in a path argument.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Cannot expand path {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Open the stage stores and classifiers described by `settings`.
pub fn open_pipeline(settings: &Settings) -> Result<Pipeline> {
    let output = expand_path(&settings.output_dir)?;
    info!(output = %output.display(), "Opening stage stores");
    let stores = StageStores::open_dirs(&output)
        .with_context(|| format!("Failed to open output directory {}", output.display()))?;
    let classifiers = from_settings(&settings.classifier).context("Failed to configure classifiers")?;
    let config = PipelineConfig::from_settings(settings)?;
    Ok(Pipeline::new(config, stores, classifiers))
}

/// Effective settings as TOML, with the API key redacted.
pub fn render_config(settings: &Settings) -> Result<String> {
    let mut shown = settings.clone();
    if shown.classifier.api_key.is_some() {
        shown.classifier.api_key = Some("<redacted>".to_string());
    }
    toml::to_string_pretty(&shown).context("Failed to render configuration")
}

/// One-line rendering of an uncaught error: kind, then message.
///
/// The kind comes from the first typed error found in the context chain;
/// the message is the context leading up to it plus that error.
pub fn render_error(err: &anyhow::Error) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        parts.push(cause.to_string());
        if let Some(kind) = error_kind(cause) {
            return format!("{}: {}", kind, parts.join(": "));
        }
    }
    format!("Error: {:#}", err)
}

fn error_kind(cause: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    if let Some(e) = cause.downcast_ref::<PipelineError>() {
        Some(e.kind())
    } else if let Some(e) = cause.downcast_ref::<StorageError>() {
        Some(ErrorKind::from(e))
    } else if let Some(e) = cause.downcast_ref::<ConvoError>() {
        Some(ErrorKind::from(e))
    } else if cause.downcast_ref::<ClassificationError>().is_some() {
        Some(ErrorKind::Classification)
    } else {
        None
    }
}

fn print_stage(report: &StageReport) {
    println!("{}", report);
    for key in &report.skipped {
        println!("  skipped {}: nothing above min_score", key);
    }
    for failure in &report.failures {
        println!("  {}", failure);
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "run {} ({} ms)",
        summary.run_id,
        (summary.finished_at - summary.started_at).num_milliseconds()
    );
    for stage in &summary.stages {
        print_stage(stage);
    }
}

/// Drive `work` until it completes or the process is asked to stop.
///
/// Records already written stay in place; an interrupted stage never leaves
/// a partial record because every write is atomic.
async fn interruptible<F: Future>(work: F) -> Result<F::Output> {
    tokio::select! {
        output = work => Ok(output),
        _ = shutdown_signal() => bail!("Interrupted; completed records were kept"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping...");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping...");
        }
    }
}
