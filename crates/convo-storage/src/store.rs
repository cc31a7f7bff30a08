//! Keyed record stores.
//!
//! Each pipeline stage owns one store and is its only writer. Records are
//! JSON documents addressed by filename-like keys.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::StorageError;

const RECORD_EXTENSION: &str = "json";

/// Keyed write / enumerate / read interface for one stage's outputs.
pub trait DurableStore: Send + Sync {
    /// Write a record, fully replacing any record with the same key.
    fn put(&self, key: &str, record: &Value) -> Result<(), StorageError>;

    /// Read a record. Missing keys yield `StorageError::NotFound`.
    fn get(&self, key: &str) -> Result<Value, StorageError>;

    /// All keys in lexicographic order.
    fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Whether a record exists for `key`.
    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.list_keys()?.iter().any(|k| k == key))
    }

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Serialize and write a typed record.
pub fn put_json<T: Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    record: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(record)?;
    store.put(key, &value)
}

/// Read and deserialize a typed record.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<T, StorageError> {
    let value = store.get(key)?;
    serde_json::from_value(value)
        .map_err(|e| StorageError::Serialization(format!("{}: {}", key, e)))
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Store backed by a directory of `{key}.json` files.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the target, so a reader sees either the old or the new document.
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened record store");
        Ok(Self { dir })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.{}", key, RECORD_EXTENSION)))
    }
}

impl DurableStore for JsonDirStore {
    fn put(&self, key: &str, record: &Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(record)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| StorageError::Persistence(format!("{}: {}", key, e)))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StorageError::Persistence(format!("{}: {}", key, e)))?;
        tmp.persist(&path)
            .map_err(|e| StorageError::Persistence(format!("{}: {}", key, e.error)))?;

        trace!(path = %path.display(), bytes = bytes.len(), "Wrote record");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Value, StorageError> {
        let path = self.path_for(key)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map_err(|e| StorageError::Serialization(format!("{}: {}", path.display(), e)))
    }

    fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// In-process store, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    name: String,
    records: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: DashMap::new(),
        }
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn put(&self, key: &str, record: &Value) -> Result<(), StorageError> {
        validate_key(key)?;
        self.records.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Value, StorageError> {
        self.records
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", self.name, key)))
    }

    fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.records.contains_key(key))
    }

    fn location(&self) -> String {
        format!("memory:{}", self.name)
    }
}
