//! Per-stage output layout.
//!
//! Under one output base directory each stage writes its own subdirectory:
//! `Data/`, `Topics/`, `Sentiment/` and `Reports/`. Record keys are the
//! segment key plus a stage suffix.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::store::{DurableStore, JsonDirStore, MemoryStore};

/// A pipeline stage that owns an output store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Segmented conversations
    Data,
    /// Topic buckets
    Topics,
    /// Per-topic sentiment records
    Sentiment,
    /// Overall sentiment reports
    Reports,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Data, Stage::Topics, Stage::Sentiment, Stage::Reports];

    /// Subdirectory name under the output base.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::Data => "Data",
            Stage::Topics => "Topics",
            Stage::Sentiment => "Sentiment",
            Stage::Reports => "Reports",
        }
    }

    /// Suffix appended to the segment key to form a record key.
    pub fn key_suffix(&self) -> &'static str {
        match self {
            Stage::Data => "",
            Stage::Topics => "_topics",
            Stage::Sentiment => "_topics_sentiment",
            Stage::Reports => "_overall",
        }
    }

    /// Record key for a segment in this stage's store.
    pub fn record_key(&self, segment_key: &str) -> String {
        format!("{}{}", segment_key, self.key_suffix())
    }

    /// Segment key recovered from a record key, if it carries this stage's suffix.
    pub fn segment_key<'a>(&self, record_key: &'a str) -> Option<&'a str> {
        record_key
            .strip_suffix(self.key_suffix())
            .filter(|k| !k.is_empty())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Data => write!(f, "segment"),
            Stage::Topics => write!(f, "topics"),
            Stage::Sentiment => write!(f, "sentiment"),
            Stage::Reports => write!(f, "reports"),
        }
    }
}

/// The four stage stores of one pipeline output location.
#[derive(Clone)]
pub struct StageStores {
    pub data: Arc<dyn DurableStore>,
    pub topics: Arc<dyn DurableStore>,
    pub sentiment: Arc<dyn DurableStore>,
    pub reports: Arc<dyn DurableStore>,
}

impl StageStores {
    /// Open directory-backed stores under `base`.
    pub fn open_dirs(base: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base = base.as_ref();
        let open = |stage: Stage| -> Result<Arc<dyn DurableStore>, StorageError> {
            Ok(Arc::new(JsonDirStore::open(base.join(stage.dir_name()))?))
        };
        Ok(Self {
            data: open(Stage::Data)?,
            topics: open(Stage::Topics)?,
            sentiment: open(Stage::Sentiment)?,
            reports: open(Stage::Reports)?,
        })
    }

    /// In-memory stores, one per stage.
    pub fn in_memory() -> Self {
        let open = |stage: Stage| -> Arc<dyn DurableStore> {
            Arc::new(MemoryStore::new(stage.dir_name()))
        };
        Self {
            data: open(Stage::Data),
            topics: open(Stage::Topics),
            sentiment: open(Stage::Sentiment),
            reports: open(Stage::Reports),
        }
    }

    /// Store owned by `stage`.
    pub fn get(&self, stage: Stage) -> &Arc<dyn DurableStore> {
        match stage {
            Stage::Data => &self.data,
            Stage::Topics => &self.topics,
            Stage::Sentiment => &self.sentiment,
            Stage::Reports => &self.reports,
        }
    }
}
