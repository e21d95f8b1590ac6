//! Document backend abstraction
//!
//! The daemon persists everything through a small document-database
//! interface: named collections of JSON documents keyed by string ids,
//! with single-document reads and atomic multi-document batch writes.
//! The chunk store's rollover invariant depends on batch atomicity.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Collection holding chunk documents (`chunk_{id}`)
pub const CHUNKS: &str = "chunks";
/// Collection holding the cursor document (`cursor`)
pub const META: &str = "meta";
/// Collection holding word hit documents (`word_{start}_{len}`)
pub const WORDS: &str = "words";

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document {collection}/{id}: {source}")]
    Malformed {
        collection: String,
        id: String,
        source: serde_json::Error,
    },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One write inside an atomic batch
#[derive(Debug, Clone)]
pub struct BatchWrite {
    pub collection: &'static str,
    pub id: String,
    pub doc: Value,
}

impl BatchWrite {
    pub fn new(collection: &'static str, id: impl Into<String>, doc: Value) -> Self {
        Self {
            collection,
            id: id.into(),
            doc,
        }
    }
}

/// A key/document store with atomic multi-document batches.
///
/// Implementations must apply `batch` all-or-nothing with respect to
/// concurrent `get`/`list` calls from this process.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Fetch a single document, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Value>>;

    /// Write a single document (upsert).
    async fn set(&self, collection: &str, id: &str, doc: Value) -> BackendResult<()>;

    /// Apply all writes atomically.
    async fn batch(&self, writes: Vec<BatchWrite>) -> BackendResult<()>;

    /// List all documents in a collection as `(id, doc)` pairs, unordered.
    async fn list(&self, collection: &str) -> BackendResult<Vec<(String, Value)>>;
}

/// Shared handle used throughout the daemon
pub type Backend = Arc<dyn DocumentBackend>;

/// Document id for a chunk
pub fn chunk_doc_id(chunk_id: u64) -> String {
    format!("chunk_{}", chunk_id)
}

/// Document id for the persisted cursor
pub const CURSOR_DOC_ID: &str = "cursor";

/// Document id for a word hit; a pure function of `(start, len)` so the
/// same hit written twice collapses to one document.
pub fn word_doc_id(start: u64, len: u32) -> String {
    format!("word_{}_{}", start, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_are_stable() {
        assert_eq!(chunk_doc_id(0), "chunk_0");
        assert_eq!(chunk_doc_id(42), "chunk_42");
        assert_eq!(word_doc_id(600, 4), "word_600_4");
    }
}
