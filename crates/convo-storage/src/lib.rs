//! Durable storage for pipeline stage outputs.
//!
//! Provides:
//! - A keyed `DurableStore` abstraction with JSON-directory and in-memory backends
//! - Atomic record writes (temp file + rename) so readers never see partial JSON
//! - The per-stage directory layout and key naming
//! - Conversation loading from a file or directory of raw logs

pub mod error;
pub mod layout;
pub mod source;
pub mod store;

pub use error::StorageError;
pub use layout::{Stage, StageStores};
pub use source::{
    load_conversations, ConversationSource, LoadBatch, LoadRejection, PathSource, RejectionKind,
};
pub use store::{get_json, put_json, DurableStore, JsonDirStore, MemoryStore};
