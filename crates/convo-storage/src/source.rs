//! Conversation loading from raw log files.
//!
//! An input path is either one JSON file (a single conversation object or an
//! array of them) or a directory whose `*.json` files are read in filename
//! order. Documents that parse as JSON but do not have the conversation shape
//! are reported as rejections instead of failing the whole load. Inside a
//! directory the same holds for whole files that cannot be read or parsed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use convo_types::Conversation;

use crate::error::StorageError;

/// What part of the input was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// One document, by position within its file, is not a conversation
    Document(usize),
    /// The whole file is not valid JSON
    Unparseable,
    /// The whole file, or its directory entry, could not be read
    Unreadable,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionKind::Document(index) => write!(f, "document {}", index),
            RejectionKind::Unparseable => write!(f, "unparseable file"),
            RejectionKind::Unreadable => write!(f, "unreadable file"),
        }
    }
}

/// Input that could not be decoded as conversations.
#[derive(Debug, Clone)]
pub struct LoadRejection {
    /// File the input came from
    pub origin: String,
    pub kind: RejectionKind,
    /// Decoder or I/O message
    pub reason: String,
}

/// Result of loading an input path.
#[derive(Debug, Default)]
pub struct LoadBatch {
    pub conversations: Vec<Conversation>,
    pub rejected: Vec<LoadRejection>,
}

impl LoadBatch {
    fn reject(&mut self, origin: &Path, kind: RejectionKind, reason: String) {
        warn!(origin = %origin.display(), %kind, error = %reason, "Rejected input");
        self.rejected.push(LoadRejection {
            origin: origin.display().to_string(),
            kind,
            reason,
        });
    }

    fn absorb(&mut self, origin: &Path, document: Value) {
        let values = match document {
            Value::Array(items) => items,
            other => vec![other],
        };
        for (index, value) in values.into_iter().enumerate() {
            match Conversation::from_value(value) {
                Ok(conversation) => self.conversations.push(conversation),
                Err(e) => self.reject(origin, RejectionKind::Document(index), e.to_string()),
            }
        }
    }
}

/// Source of raw conversations.
pub trait ConversationSource {
    fn load(&self) -> Result<LoadBatch, StorageError>;
}

/// Conversations read from a file or directory path.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
}

impl PathSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConversationSource for PathSource {
    fn load(&self) -> Result<LoadBatch, StorageError> {
        load_conversations(&self.path)
    }
}

fn is_json_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn read_document(path: &Path) -> Result<Value, StorageError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| StorageError::Serialization(format!("{}: {}", path.display(), e)))
}

/// Load every conversation found at `path`.
///
/// Fails with `StorageError::NotFound` when the path does not exist. A single
/// input file that cannot be read or parsed fails the load; inside a
/// directory such a file is rejected and the remaining files still load.
pub fn load_conversations(path: impl AsRef<Path>) -> Result<LoadBatch, StorageError> {
    let path = path.as_ref();
    let mut batch = LoadBatch::default();

    if path.is_file() {
        batch.absorb(path, read_document(path)?);
    } else if path.is_dir() {
        let entries = WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let origin = e.path().unwrap_or(path).to_path_buf();
                    batch.reject(&origin, RejectionKind::Unreadable, e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_json_file(entry.path()) {
                continue;
            }

            debug!(file = %entry.path().display(), "Reading conversation file");
            match read_document(entry.path()) {
                Ok(document) => batch.absorb(entry.path(), document),
                Err(StorageError::Serialization(reason)) => {
                    batch.reject(entry.path(), RejectionKind::Unparseable, reason)
                }
                Err(e) => batch.reject(entry.path(), RejectionKind::Unreadable, e.to_string()),
            }
        }
    } else {
        return Err(StorageError::NotFound(path.display().to_string()));
    }

    info!(
        path = %path.display(),
        conversations = batch.conversations.len(),
        rejected = batch.rejected.len(),
        "Loaded conversations"
    );
    Ok(batch)
}
