//! Conversation segmentation.
//!
//! Each conversation becomes one segment named after its owning human and
//! conversation id. Recurrences of the same base key within one run get
//! `_2`, `_3`, ... suffixes in encounter order; nothing is overwritten within
//! a run. Collisions with records from earlier runs are governed by
//! [`KeyPolicy`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use ulid::Ulid;

use convo_types::{Conversation, KeyPolicy, SegmentKey};

use crate::error::{PipelineError, SegmentFailure};

/// Run-scoped key state. Create one per invocation; never share across runs.
#[derive(Debug)]
pub struct SegmentRun {
    run_id: Ulid,
    policy: KeyPolicy,
    occurrences: HashMap<String, u32>,
    emitted: HashSet<String>,
}

impl SegmentRun {
    pub fn new(policy: KeyPolicy) -> Self {
        Self::with_run_id(policy, Ulid::new())
    }

    pub fn with_run_id(policy: KeyPolicy, run_id: Ulid) -> Self {
        Self {
            run_id,
            policy,
            occurrences: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    pub fn run_id(&self) -> Ulid {
        self.run_id
    }

    /// Allocate the output key for the next occurrence of `base`.
    ///
    /// The first occurrence gets the bare key, later ones `_{n}` with `n`
    /// strictly increasing from 2. A candidate already emitted this run
    /// (e.g. a base key that itself ends in `_2`) is passed over.
    pub fn next_key(&mut self, base: &str) -> String {
        let base = match self.policy {
            KeyPolicy::Overwrite => base.to_string(),
            KeyPolicy::RunScoped => format!("{}_{}", base, self.run_id.to_string().to_lowercase()),
        };

        let count = self.occurrences.entry(base.clone()).or_insert(0);
        loop {
            *count += 1;
            let candidate = if *count == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, count)
            };
            if self.emitted.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// A conversation with its unique output key.
#[derive(Debug, Clone)]
pub struct Segment {
    pub key: String,
    pub conversation: Conversation,
}

/// Output of segmenting one batch of conversations.
#[derive(Debug, Default)]
pub struct SegmentBatch {
    pub segments: Vec<Segment>,
    pub failures: Vec<SegmentFailure>,
}

/// Partitions conversations into uniquely keyed per-(human, conversation) segments.
#[derive(Debug, Clone)]
pub struct ConversationSegmenter {
    operator_id: i64,
}

impl ConversationSegmenter {
    pub fn new(operator_id: i64) -> Self {
        Self { operator_id }
    }

    /// Identify the owning human of a conversation.
    pub fn segment_key(&self, conversation: &Conversation) -> Result<SegmentKey, PipelineError> {
        conversation
            .segment_key(self.operator_id)
            .map_err(|e| PipelineError::MalformedConversation(e.to_string()))
    }

    /// Key every conversation. Malformed conversations are reported and skipped
    /// without consuming a key.
    pub fn segment(&self, conversations: Vec<Conversation>, run: &mut SegmentRun) -> SegmentBatch {
        let mut batch = SegmentBatch::default();

        for conversation in conversations {
            match self.segment_key(&conversation) {
                Ok(segment_key) => {
                    let key = run.next_key(&segment_key.base());
                    debug!(key = %key, messages = conversation.messages.len(), "Segmented conversation");
                    batch.segments.push(Segment { key, conversation });
                }
                Err(e) => {
                    warn!(
                        conversation_id = %conversation.conversation_id,
                        error = %e,
                        "Skipping conversation"
                    );
                    batch.failures.push(SegmentFailure::new(None, &e));
                }
            }
        }

        batch
    }
}
