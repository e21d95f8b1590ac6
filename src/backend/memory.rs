//! In-memory backend for tests and ephemeral runs

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{BackendResult, BatchWrite, DocumentBackend};

/// A backend that keeps all documents in process memory.
///
/// Batch writes are atomic by holding the map lock for the whole batch.
/// Useful for unit tests and for running the daemon without durability.
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, HashMap<String, Value>>>,
    /// When set, every write fails. Lets tests exercise failure paths.
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle write failures (test hook).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Value>> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> BackendResult<()> {
        if self.writes_failing() {
            return Err(super::BackendError::Unavailable("write failure injected".into()));
        }
        let mut collections = self.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn batch(&self, writes: Vec<BatchWrite>) -> BackendResult<()> {
        if self.writes_failing() {
            return Err(super::BackendError::Unavailable("write failure injected".into()));
        }
        let mut collections = self.collections.lock().await;
        for w in writes {
            collections
                .entry(w.collection.to_string())
                .or_default()
                .insert(w.id, w.doc);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> BackendResult<Vec<(String, Value)>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
