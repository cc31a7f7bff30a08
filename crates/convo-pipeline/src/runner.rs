//! Stage orchestration.
//!
//! Each stage reads the complete contents of its predecessor's store and
//! writes one record per segment into its own. A failing segment is recorded
//! in the stage report and the stage moves on; only a store that cannot be
//! enumerated aborts a stage.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use convo_classify::Classifiers;
use convo_storage::{
    get_json, put_json, DurableStore, LoadBatch, LoadRejection, RejectionKind, Stage, StageStores,
};
use convo_types::{Conversation, KeyPolicy, SentimentSummary, Settings, TopicBucket};

use crate::aggregator::{AggregatorConfig, SentimentAggregator};
use crate::bucketer::{BucketerConfig, TopicBucketer};
use crate::error::{PipelineError, SegmentFailure};
use crate::report::build_report;
use crate::segmenter::{ConversationSegmenter, SegmentRun};

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub operator_id: i64,
    pub key_policy: KeyPolicy,
    pub bucketer: BucketerConfig,
    pub aggregator: AggregatorConfig,
}

impl PipelineConfig {
    /// Config with default aggregation and key policy.
    pub fn new(bucketer: BucketerConfig) -> Self {
        Self {
            operator_id: convo_types::DEFAULT_OPERATOR_ID,
            key_policy: KeyPolicy::default(),
            bucketer,
            aggregator: AggregatorConfig::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        Ok(Self {
            operator_id: settings.operator_id,
            key_policy: settings.segmenter.key_policy,
            bucketer: BucketerConfig::from_settings(settings)?,
            aggregator: AggregatorConfig::from_settings(settings)?,
        })
    }

    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }
}

/// Outcome of one stage over all segments.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    /// Segment keys whose record was written
    pub written: Vec<String>,
    /// Segment keys with nothing to write
    pub skipped: Vec<String>,
    pub failures: Vec<SegmentFailure>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage: stage.to_string(),
            written: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, key: Option<&str>, error: &PipelineError) {
        warn!(
            stage = %self.stage,
            segment = key.unwrap_or("-"),
            kind = %error.kind(),
            error = %error,
            "Segment failed"
        );
        self.failures
            .push(SegmentFailure::new(key.map(str::to_string), error));
    }

    /// Whether every segment succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} written, {} skipped, {} failed",
            self.stage,
            self.written.len(),
            self.skipped.len(),
            self.failures.len()
        )
    }
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    /// Failures across all stages, in stage order.
    pub fn failures(&self) -> impl Iterator<Item = &SegmentFailure> {
        self.stages.iter().flat_map(|s| s.failures.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(StageReport::is_clean)
    }
}

/// The four-stage conversation sentiment pipeline bound to its stores.
pub struct Pipeline {
    config: PipelineConfig,
    stores: StageStores,
    segmenter: ConversationSegmenter,
    bucketer: TopicBucketer,
    aggregator: SentimentAggregator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, stores: StageStores, classifiers: Classifiers) -> Self {
        let segmenter = ConversationSegmenter::new(config.operator_id);
        let bucketer = TopicBucketer::new(
            classifiers.topic,
            config.bucketer.clone().with_operator_id(config.operator_id),
        );
        let aggregator = SentimentAggregator::new(classifiers.sentiment, config.aggregator.clone());
        Self {
            config,
            stores,
            segmenter,
            bucketer,
            aggregator,
        }
    }

    pub fn stores(&self) -> &StageStores {
        &self.stores
    }

    /// Segment loaded conversations into the data store under a fresh run.
    pub fn segment(&self, batch: LoadBatch) -> StageReport {
        let mut run = SegmentRun::new(self.config.key_policy);
        self.segment_with(batch, &mut run)
    }

    /// Segment loaded conversations under an existing run.
    pub fn segment_with(&self, batch: LoadBatch, run: &mut SegmentRun) -> StageReport {
        let mut report = StageReport::new(Stage::Data);
        let store = self.stores.data.as_ref();
        info!(
            run_id = %run.run_id(),
            conversations = batch.conversations.len(),
            store = %store.location(),
            "Segmenting conversations"
        );

        for rejection in &batch.rejected {
            report.fail(None, &rejection_error(rejection));
        }

        let segmented = self.segmenter.segment(batch.conversations, run);
        report.failures.extend(segmented.failures);

        for segment in segmented.segments {
            let key = Stage::Data.record_key(&segment.key);
            if self.config.key_policy == KeyPolicy::Overwrite {
                match store.contains(&key) {
                    Ok(true) => warn!(key = %key, "Overwriting record from a previous run"),
                    Ok(false) => {}
                    Err(e) => debug!(key = %key, error = %e, "Could not check for an existing record"),
                }
            }
            match put_json(store, &key, &segment.conversation) {
                Ok(()) => {
                    debug!(key = %key, "Wrote segment");
                    report.written.push(segment.key);
                }
                Err(e) => report.fail(Some(&segment.key), &PipelineError::from(e)),
            }
        }

        info!(%report, "Stage complete");
        report
    }

    /// Bucket every stored segment by topic.
    pub async fn bucket_topics(&self) -> Result<StageReport, PipelineError> {
        let mut report = StageReport::new(Stage::Topics);
        let source = &self.stores.data;
        let sink = &self.stores.topics;
        let keys = list_record_keys(source).await?;
        info!(
            segments = keys.len(),
            threshold = self.config.bucketer.threshold(),
            topics = self.config.bucketer.candidates().len(),
            "Bucketing topics"
        );

        for record_key in keys {
            let Some(segment) = segment_of(Stage::Data, &record_key) else {
                continue;
            };
            match self.bucket_one(source, sink, segment).await {
                Ok(topics) => {
                    debug!(segment = %segment, topics, "Wrote topic bucket");
                    report.written.push(segment.to_string());
                }
                Err(e) => report.fail(Some(segment), &e),
            }
        }

        info!(%report, "Stage complete");
        Ok(report)
    }

    async fn bucket_one(
        &self,
        source: &Arc<dyn DurableStore>,
        sink: &Arc<dyn DurableStore>,
        segment: &str,
    ) -> Result<usize, PipelineError> {
        let conversation: Conversation = read_record(source, Stage::Data.record_key(segment)).await?;
        let bucket = self.bucketer.extract_topics(&conversation).await?;
        write_record(sink, Stage::Topics.record_key(segment), &bucket).await?;
        Ok(bucket.len())
    }

    /// Aggregate sentiment for every stored topic bucket.
    ///
    /// Segments with no topic left after filtering are reported as skipped
    /// and get no record.
    pub async fn aggregate_sentiment(&self) -> Result<StageReport, PipelineError> {
        let mut report = StageReport::new(Stage::Sentiment);
        let source = &self.stores.topics;
        let sink = &self.stores.sentiment;
        let keys = list_record_keys(source).await?;
        info!(
            segments = keys.len(),
            min_score = self.config.aggregator.min_score(),
            max_per_topic = ?self.config.aggregator.max_per_topic(),
            "Aggregating sentiment"
        );

        for record_key in keys {
            let Some(segment) = segment_of(Stage::Topics, &record_key) else {
                continue;
            };
            match self.aggregate_one(source, sink, segment).await {
                Ok(Some(topics)) => {
                    debug!(segment = %segment, topics, "Wrote sentiment record");
                    report.written.push(segment.to_string());
                }
                Ok(None) => {
                    info!(segment = %segment, "No topic above min_score, skipping");
                    report.skipped.push(segment.to_string());
                }
                Err(e) => report.fail(Some(segment), &e),
            }
        }

        info!(%report, "Stage complete");
        Ok(report)
    }

    async fn aggregate_one(
        &self,
        source: &Arc<dyn DurableStore>,
        sink: &Arc<dyn DurableStore>,
        segment: &str,
    ) -> Result<Option<usize>, PipelineError> {
        let bucket: TopicBucket = read_record(source, Stage::Topics.record_key(segment)).await?;
        let summary = self.aggregator.aggregate(&bucket).await?;
        if summary.is_empty() {
            return Ok(None);
        }
        write_record(sink, Stage::Sentiment.record_key(segment), &summary).await?;
        Ok(Some(summary.len()))
    }

    /// Build an overall report for every stored sentiment record.
    pub fn build_reports(&self) -> Result<StageReport, PipelineError> {
        let mut report = StageReport::new(Stage::Reports);
        let source = self.stores.sentiment.as_ref();
        let sink = self.stores.reports.as_ref();
        let keys = source.list_keys()?;
        info!(segments = keys.len(), "Building reports");

        for record_key in keys {
            let Some(segment) = segment_of(Stage::Sentiment, &record_key) else {
                continue;
            };
            match report_one(source, sink, segment) {
                Ok(()) => report.written.push(segment.to_string()),
                Err(e) => report.fail(Some(segment), &e),
            }
        }

        info!(%report, "Stage complete");
        Ok(report)
    }

    /// Run all four stages in order.
    pub async fn run(&self, batch: LoadBatch) -> Result<RunSummary, PipelineError> {
        let mut run = SegmentRun::new(self.config.key_policy);
        let run_id = run.run_id().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, "Starting pipeline run");

        let segmented = self.segment_with(batch, &mut run);
        let topics = self.bucket_topics().await?;
        let sentiment = self.aggregate_sentiment().await?;
        let reports = self.build_reports()?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stages: vec![segmented, topics, sentiment, reports],
        };
        info!(
            run_id = %summary.run_id,
            failures = summary.failures().count(),
            "Pipeline run complete"
        );
        Ok(summary)
    }
}

fn report_one(source: &dyn DurableStore, sink: &dyn DurableStore, segment: &str) -> Result<(), PipelineError> {
    let summary: SentimentSummary = get_json(source, &Stage::Sentiment.record_key(segment))?;
    for (topic, record) in &summary {
        record
            .validate()
            .map_err(|e| PipelineError::Schema(format!("topic {}: {}", topic, e)))?;
    }
    put_json(sink, &Stage::Reports.record_key(segment), &build_report(&summary))?;
    Ok(())
}

// Async stages keep store I/O off the runtime's worker threads.

async fn list_record_keys(store: &Arc<dyn DurableStore>) -> Result<Vec<String>, PipelineError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.list_keys())
        .await
        .map_err(|e| PipelineError::Persistence(format!("Task error: {}", e)))?
        .map_err(PipelineError::from)
}

async fn read_record<T>(store: &Arc<dyn DurableStore>, key: String) -> Result<T, PipelineError>
where
    T: DeserializeOwned + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || get_json::<T>(store.as_ref(), &key))
        .await
        .map_err(|e| PipelineError::Persistence(format!("Task error: {}", e)))?
        .map_err(PipelineError::from)
}

async fn write_record<T: Serialize + ?Sized>(
    store: &Arc<dyn DurableStore>,
    key: String,
    record: &T,
) -> Result<(), PipelineError> {
    let value = serde_json::to_value(record).map_err(|e| PipelineError::Schema(e.to_string()))?;
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.put(&key, &value))
        .await
        .map_err(|e| PipelineError::Persistence(format!("Task error: {}", e)))?
        .map_err(PipelineError::from)
}

/// Failure for input the loader could not turn into conversations.
fn rejection_error(rejection: &LoadRejection) -> PipelineError {
    let message = format!("{} [{}]: {}", rejection.origin, rejection.kind, rejection.reason);
    match rejection.kind {
        RejectionKind::Document(_) => PipelineError::MalformedConversation(message),
        RejectionKind::Unparseable => PipelineError::Schema(message),
        RejectionKind::Unreadable => PipelineError::Persistence(message),
    }
}

fn segment_of(stage: Stage, record_key: &str) -> Option<&str> {
    let segment = stage.segment_key(record_key);
    if segment.is_none() {
        warn!(stage = %stage, key = %record_key, "Ignoring record without stage suffix");
    }
    segment
}

#[cfg(test)]
mod tests {
    use super::*;

    use convo_classify::{MockSentimentClassifier, MockTopicClassifier};
    use convo_storage::{MemoryStore, StorageError};
    use convo_types::{ConversationId, Message, OverallReport, SentimentLabel};
    use serde_json::json;

    use crate::error::ErrorKind;

    fn human(text: &str, ts: &str) -> Message {
        Message::new(7, Some("alice".into()), text, ts)
    }

    fn conversation(id: i64, messages: Vec<Message>) -> Conversation {
        let mut all = vec![Message::new(1, Some("operator".into()), "How was your day?", "t0")];
        all.extend(messages);
        Conversation::new(ConversationId::from(id), all)
    }

    fn batch(conversations: Vec<Conversation>) -> LoadBatch {
        LoadBatch {
            conversations,
            rejected: Vec::new(),
        }
    }

    fn pipeline(topic: MockTopicClassifier, sentiment: MockSentimentClassifier) -> Pipeline {
        let bucketer = BucketerConfig::new(vec!["app_usability".to_string()], 0.5).unwrap();
        Pipeline::new(
            PipelineConfig::new(bucketer),
            StageStores::in_memory(),
            Classifiers {
                topic: Arc::new(topic),
                sentiment: Arc::new(sentiment),
            },
        )
    }

    fn tie_pipeline() -> Pipeline {
        pipeline(
            MockTopicClassifier::new()
                .with_score("I love this app", "app_usability", 0.9)
                .with_score("crashes constantly", "app_usability", 0.9),
            MockSentimentClassifier::new()
                .with_result("I love this app", SentimentLabel::Positive, 0.95)
                .with_result("crashes constantly", SentimentLabel::Negative, 0.9),
        )
    }

    #[tokio::test]
    async fn test_full_run_tie_scenario() {
        let pipeline = tie_pipeline();
        let summary = pipeline
            .run(batch(vec![conversation(
                42,
                vec![human("I love this app", "t1"), human("crashes constantly", "t2")],
            )]))
            .await
            .unwrap();

        assert!(summary.is_clean());
        assert!(summary.started_at <= summary.finished_at);
        assert_eq!(summary.stages.len(), 4);
        for stage in &summary.stages {
            assert_eq!(stage.written, vec!["alice_42"]);
        }

        let stores = pipeline.stores();
        let topics = stores.topics.get("alice_42_topics").unwrap();
        assert_eq!(
            topics,
            json!({"app_usability": [
                {"transaction_datetime_utc": "t1", "message": "I love this app", "score": 0.9},
                {"transaction_datetime_utc": "t2", "message": "crashes constantly", "score": 0.9}
            ]})
        );

        let sentiment = stores.sentiment.get("alice_42_topics_sentiment").unwrap();
        assert_eq!(sentiment["app_usability"]["overall_sentiment"], "POSITIVE");
        assert_eq!(sentiment["app_usability"]["positive_count"], 1);
        assert_eq!(sentiment["app_usability"]["negative_count"], 1);

        let report: OverallReport = get_json(stores.reports.as_ref(), "alice_42_overall").unwrap();
        assert_eq!(report.get("app_usability"), Some(&SentimentLabel::Positive));
        assert_eq!(report.len(), 1);
    }

    #[tokio::test]
    async fn test_below_min_score_is_skipped() {
        let bucketer = BucketerConfig::new(vec!["app_usability".to_string()], 0.5).unwrap();
        let pipeline = Pipeline::new(
            PipelineConfig::new(bucketer).with_aggregator(AggregatorConfig::new(0.6, Some(3)).unwrap()),
            StageStores::in_memory(),
            Classifiers {
                topic: Arc::new(MockTopicClassifier::new().with_score("meh", "app_usability", 0.55)),
                sentiment: Arc::new(MockSentimentClassifier::new()),
            },
        );

        let summary = pipeline
            .run(batch(vec![conversation(5, vec![human("meh", "t1")])]))
            .await
            .unwrap();

        let sentiment = &summary.stages[2];
        assert_eq!(sentiment.skipped, vec!["alice_5"]);
        assert!(sentiment.written.is_empty());
        assert!(sentiment.is_clean());
        assert!(pipeline.stores().sentiment.list_keys().unwrap().is_empty());
        assert!(pipeline.stores().reports.list_keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_segment_does_not_abort_stage() {
        let pipeline = pipeline(
            MockTopicClassifier::new()
                .with_default_score(0.9)
                .failing_on("boom"),
            MockSentimentClassifier::new(),
        );

        let summary = pipeline
            .run(batch(vec![
                conversation(1, vec![human("boom", "t1")]),
                conversation(2, vec![human("all good", "t1")]),
            ]))
            .await
            .unwrap();

        let topics = &summary.stages[1];
        assert_eq!(topics.written, vec!["alice_2"]);
        assert_eq!(topics.failures.len(), 1);
        assert_eq!(topics.failures[0].key.as_deref(), Some("alice_1"));
        assert_eq!(topics.failures[0].kind, ErrorKind::Classification);
        assert_eq!(summary.stages[3].written, vec!["alice_2"]);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_segment_records_rejections_and_duplicates() {
        let pipeline = tie_pipeline();
        let load = LoadBatch {
            conversations: vec![
                conversation(42, vec![human("hi", "t1")]),
                conversation(42, vec![human("hi again", "t2")]),
            ],
            rejected: vec![
                LoadRejection {
                    origin: "in.json".into(),
                    kind: RejectionKind::Document(3),
                    reason: "missing field `messages_list`".into(),
                },
                LoadRejection {
                    origin: "broken.json".into(),
                    kind: RejectionKind::Unparseable,
                    reason: "EOF while parsing an object".into(),
                },
            ],
        };

        let report = pipeline.segment(load);
        assert_eq!(report.written, vec!["alice_42", "alice_42_2"]);
        let kinds: Vec<ErrorKind> = report.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::MalformedConversation, ErrorKind::Schema]);
        assert!(report.failures.iter().all(|f| f.key.is_none()));
        assert!(report.failures[0].message.contains("in.json [document 3]"));
        assert_eq!(
            pipeline.stores().data.list_keys().unwrap(),
            vec!["alice_42", "alice_42_2"]
        );
    }

    /// Store that writes normally but cannot enumerate or look up its keys.
    struct UnlistableStore(MemoryStore);

    impl DurableStore for UnlistableStore {
        fn put(&self, key: &str, record: &serde_json::Value) -> Result<(), StorageError> {
            self.0.put(key, record)
        }

        fn get(&self, key: &str) -> Result<serde_json::Value, StorageError> {
            self.0.get(key)
        }

        fn list_keys(&self) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Persistence("listing unavailable".into()))
        }

        fn location(&self) -> String {
            "unlistable".into()
        }
    }

    #[test]
    fn test_existing_record_check_failure_does_not_block_write() {
        let mut stores = StageStores::in_memory();
        stores.data = Arc::new(UnlistableStore(MemoryStore::new("Data")));
        let bucketer = BucketerConfig::new(vec!["app_usability".to_string()], 0.5).unwrap();
        let pipeline = Pipeline::new(
            PipelineConfig::new(bucketer),
            stores,
            Classifiers {
                topic: Arc::new(MockTopicClassifier::new()),
                sentiment: Arc::new(MockSentimentClassifier::new()),
            },
        );

        let report = pipeline.segment(batch(vec![conversation(42, vec![human("hi", "t1")])]));
        assert!(report.is_clean());
        assert_eq!(report.written, vec!["alice_42"]);
        assert!(pipeline.stores().data.get("alice_42").is_ok());
    }

    #[tokio::test]
    async fn test_stages_rerun_from_stored_outputs() {
        let pipeline = tie_pipeline();
        pipeline.segment(batch(vec![conversation(
            42,
            vec![human("I love this app", "t1"), human("crashes constantly", "t2")],
        )]));

        let first = pipeline.bucket_topics().await.unwrap();
        let stored = pipeline.stores().topics.get("alice_42_topics").unwrap();
        let second = pipeline.bucket_topics().await.unwrap();
        assert_eq!(first.written, second.written);
        assert_eq!(pipeline.stores().topics.get("alice_42_topics").unwrap(), stored);

        pipeline.aggregate_sentiment().await.unwrap();
        let reports = pipeline.build_reports().unwrap();
        assert_eq!(reports.written, vec!["alice_42"]);
    }

    #[tokio::test]
    async fn test_foreign_and_corrupt_records() {
        let pipeline = tie_pipeline();
        let sentiment = pipeline.stores().sentiment.as_ref();
        sentiment.put("notes", &json!({"x": 1})).unwrap();
        sentiment
            .put(
                "bob_9_topics_sentiment",
                &json!({"app_usability": {
                    "overall_sentiment": "NEGATIVE",
                    "positive_count": 2,
                    "negative_count": 0,
                    "messages": []
                }}),
            )
            .unwrap();

        let report = pipeline.build_reports().unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key.as_deref(), Some("bob_9"));
        assert_eq!(report.failures[0].kind, ErrorKind::Schema);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::default();
        let config = PipelineConfig::from_settings(&settings).unwrap();
        assert_eq!(config.bucketer.threshold(), 0.7);
        assert_eq!(config.bucketer.candidates().len(), 11);
        assert_eq!(config.aggregator.max_per_topic(), Some(3));
        assert_eq!(config.key_policy, KeyPolicy::Overwrite);
    }

    #[test]
    fn test_stage_report_display() {
        let mut report = StageReport::new(Stage::Sentiment);
        report.written.push("a".into());
        report.skipped.push("b".into());
        assert_eq!(report.to_string(), "sentiment: 1 written, 1 skipped, 0 failed");
    }
}
