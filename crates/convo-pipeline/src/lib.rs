//! # convo-pipeline
//!
//! Turns raw conversation logs into per-topic sentiment reports.
//!
//! Stages, each persisting its output as the input of the next:
//! 1. `segmenter`: one uniquely keyed record per (human, conversation)
//! 2. `bucketer`: non-operator messages grouped by topic above a threshold
//! 3. `aggregator`: ranked, capped hits scored for sentiment and voted per topic
//! 4. `report`: per-topic overall sentiment labels
//!
//! `runner::Pipeline` wires the stages to their stores and isolates
//! per-segment failures so one bad segment never aborts a run.

pub mod aggregator;
pub mod bucketer;
pub mod error;
pub mod report;
pub mod runner;
pub mod segmenter;

pub use aggregator::{select_hits, AggregatorConfig, SentimentAggregator};
pub use bucketer::{BucketerConfig, TopicBucketer};
pub use error::{ErrorKind, PipelineError, SegmentFailure};
pub use report::build_report;
pub use runner::{Pipeline, PipelineConfig, RunSummary, StageReport};
pub use segmenter::{ConversationSegmenter, Segment, SegmentBatch, SegmentRun};
