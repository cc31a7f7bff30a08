//! End-to-end test infrastructure for the conversation pipeline.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full load-to-report pipeline over directory-backed stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use convo_classify::{Classifiers, MockSentimentClassifier, MockTopicClassifier};
use convo_pipeline::{BucketerConfig, Pipeline, PipelineConfig};
use convo_storage::{Stage, StageStores};

/// Sender id used for the human side of generated conversations.
pub const HUMAN_ID: i64 = 7;

/// Shared test harness for E2E tests.
///
/// Owns a temp directory with an `input/` directory for raw conversation
/// files and an `Output/` base holding the four stage stores.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Directory for raw input files
    pub input_dir: PathBuf,
    /// Output base directory
    pub output_dir: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with temp directory layout.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("Output");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        Self {
            _temp_dir: temp_dir,
            input_dir,
            output_dir,
        }
    }

    /// Open fresh handles on the stage stores under the output directory.
    pub fn stores(&self) -> StageStores {
        StageStores::open_dirs(&self.output_dir).expect("Failed to open stage stores")
    }

    /// Build a pipeline over this harness's stores.
    pub fn pipeline(&self, config: PipelineConfig, classifiers: Classifiers) -> Pipeline {
        Pipeline::new(config, self.stores(), classifiers)
    }

    /// Write a raw input document and return its path.
    pub fn write_input(&self, name: &str, document: &Value) -> PathBuf {
        let path = self.input_dir.join(name);
        let text = serde_json::to_string_pretty(document).expect("Failed to encode input");
        std::fs::write(&path, text).expect("Failed to write input");
        path
    }

    /// Path of a stage record for a segment.
    pub fn record_path(&self, stage: Stage, segment: &str) -> PathBuf {
        self.output_dir
            .join(stage.dir_name())
            .join(format!("{}.json", stage.record_key(segment)))
    }

    /// Read a stage record straight from disk.
    pub fn read_record(&self, stage: Stage, segment: &str) -> Value {
        read_json(&self.record_path(stage, segment))
    }

    /// Record file names present in a stage directory, sorted.
    pub fn record_files(&self, stage: Stage) -> Vec<String> {
        let dir = self.output_dir.join(stage.dir_name());
        let mut names: Vec<String> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a JSON file.
pub fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    serde_json::from_str(&text).expect("Failed to parse record")
}

/// A raw conversation document: an operator greeting followed by the
/// given `(text, timestamp)` messages from `screen_name`.
pub fn raw_conversation(conversation_id: Value, screen_name: &str, messages: &[(&str, &str)]) -> Value {
    let mut list = vec![json!({
        "ref_user_id": 1,
        "screen_name": "operator",
        "message": "Hi! How has your week been?",
        "transaction_datetime_utc": "2024-03-01T10:00:00Z"
    })];
    list.extend(messages.iter().map(|(text, ts)| {
        json!({
            "ref_user_id": HUMAN_ID,
            "screen_name": screen_name,
            "message": text,
            "transaction_datetime_utc": ts
        })
    }));
    json!({
        "ref_conversation_id": conversation_id,
        "messages_list": list
    })
}

/// Pipeline config over the given topics and threshold, other values default.
pub fn config(topics: &[&str], threshold: f64) -> PipelineConfig {
    let topics = topics.iter().map(|t| t.to_string()).collect();
    PipelineConfig::new(BucketerConfig::new(topics, threshold).expect("Invalid bucketer config"))
}

/// Bundle mock classifiers.
pub fn mock_classifiers(topic: MockTopicClassifier, sentiment: MockSentimentClassifier) -> Classifiers {
    Classifiers {
        topic: Arc::new(topic),
        sentiment: Arc::new(sentiment),
    }
}
