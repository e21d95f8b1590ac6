//! Chunked append-only character store
//!
//! The stream is partitioned into fixed-size chunks kept in the document
//! backend. Exactly one "working" chunk (the one under the cursor) lives
//! in RAM and is mutated by appends; finished chunks are immutable and
//! cached in a bounded LRU. A background flusher mirrors the working
//! chunk and the cursor to the backend in a single atomic batch every
//! couple of seconds, so a restart can never observe a cursor without
//! the matching working-chunk text.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, BatchWrite, CHUNKS, CURSOR_DOC_ID, META, chunk_doc_id};

/// Characters per chunk in production.
pub const CHUNK_SIZE: usize = 8192;
/// Finished chunks kept in RAM.
pub const LRU_CAPACITY: usize = 32;
/// How often the working chunk and cursor are mirrored to the backend.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Errors from chunk store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tuning knobs; tests shrink the chunk size and flush interval.
#[derive(Debug, Clone)]
pub struct ChunkStoreConfig {
    pub chunk_size: usize,
    pub lru_capacity: usize,
    pub flush_interval: Duration,
}

impl Default for ChunkStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            lru_capacity: LRU_CAPACITY,
            flush_interval: FLUSH_INTERVAL,
        }
    }
}

struct Inner {
    /// The chunk currently receiving appends. Always `cursor % chunk_size`
    /// characters long between operations.
    working: String,
    working_id: u64,
    /// Absolute index of the next character to be written.
    cursor: u64,
    /// Set on append, cleared once the backend mirrors the state.
    dirty: bool,
    lru: LruCache<u64, Arc<str>>,
}

struct Flusher {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Durable append-only character storage addressable by absolute index.
pub struct ChunkStore {
    backend: Backend,
    chunk_size: usize,
    inner: Mutex<Inner>,
    flusher: std::sync::Mutex<Option<Flusher>>,
}

impl ChunkStore {
    /// Recover (or initialize) a store from the backend and start the
    /// cursor flusher.
    pub async fn create(backend: Backend, config: ChunkStoreConfig) -> StoreResult<Arc<Self>> {
        let cursor = match backend.get(META, CURSOR_DOC_ID).await? {
            Some(doc) => doc.get("index").and_then(serde_json::Value::as_u64).unwrap_or(0),
            None => 0,
        };

        let mut working_id = cursor / config.chunk_size as u64;
        let mut working = String::new();
        let mut lru = LruCache::new(NonZeroUsize::new(config.lru_capacity).expect("lru capacity > 0"));

        if let Some(doc) = backend.get(CHUNKS, &chunk_doc_id(working_id)).await?
            && let Some(text) = doc.get("text").and_then(serde_json::Value::as_str)
        {
            if text.len() < config.chunk_size {
                working.push_str(text);
                // The batch invariant keeps these in step; a longer mirror
                // can only mean the cursor doc is the older of the two.
                let offset = (cursor % config.chunk_size as u64) as usize;
                if working.len() > offset {
                    warn!(
                        chunk_id = working_id,
                        mirrored = working.len(),
                        offset,
                        "working chunk longer than cursor offset, truncating"
                    );
                    working.truncate(offset);
                }
            } else {
                lru.put(working_id, Arc::from(text));
                working_id += 1;
            }
        }

        info!(cursor, working_id, working_len = working.len(), "chunk store recovered");

        let store = Arc::new(Self {
            backend,
            chunk_size: config.chunk_size,
            inner: Mutex::new(Inner {
                working,
                working_id,
                cursor,
                dirty: false,
                lru,
            }),
            flusher: std::sync::Mutex::new(None),
        });

        store.start_flusher(config.flush_interval);
        Ok(store)
    }

    fn start_flusher(self: &Arc<Self>, interval: Duration) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush_cursor_tick().await {
                            warn!(error = %e, "cursor flush failed, retrying next tick");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("chunk store flusher stopped");
        });

        *self.flusher.lock().expect("flusher lock") = Some(Flusher { stop: stop_tx, task });
    }

    /// Append one character, returning its absolute index.
    ///
    /// Must be called from a single logical writer. The character that
    /// completes a chunk is committed only after the atomic chunk+cursor
    /// batch lands; if that write fails, neither the cursor nor the
    /// working buffer advances and the error propagates.
    pub async fn append(&self, ch: char) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let idx = inner.cursor;

        if inner.working.len() + 1 == self.chunk_size {
            self.flush_full(&mut inner, ch).await?;
        } else {
            inner.cursor += 1;
            inner.working.push(ch);
            inner.dirty = true;
        }

        Ok(idx)
    }

    /// Complete the working chunk with `ch`: persist the full chunk text
    /// and the advanced cursor in one batch, then promote the chunk into
    /// the LRU and open a fresh working buffer. Nothing in `inner` is
    /// touched until the batch succeeds.
    async fn flush_full(&self, inner: &mut Inner, ch: char) -> StoreResult<()> {
        let id = inner.working_id;
        let cursor = inner.cursor + 1;
        let mut text = String::with_capacity(self.chunk_size);
        text.push_str(&inner.working);
        text.push(ch);

        self.backend
            .batch(vec![
                BatchWrite::new(CHUNKS, chunk_doc_id(id), json!({ "text": text })),
                BatchWrite::new(META, CURSOR_DOC_ID, json!({ "index": cursor })),
            ])
            .await?;

        inner.lru.put(id, Arc::from(text.as_str()));
        inner.working_id += 1;
        inner.working.clear();
        inner.cursor = cursor;
        inner.dirty = false;
        debug!(chunk_id = id, cursor, "chunk rolled over");
        Ok(())
    }

    /// Mirror the partial working chunk and the cursor if anything changed
    /// since the last flush. Idempotent; failures are retried by the timer.
    pub async fn flush_cursor_tick(&self) -> StoreResult<()> {
        // The lock is held across the write so a rollover cannot interleave
        // and be clobbered by a stale partial mirror.
        let mut inner = self.inner.lock().await;
        if !inner.dirty {
            return Ok(());
        }

        self.backend
            .batch(vec![
                BatchWrite::new(CHUNKS, chunk_doc_id(inner.working_id), json!({ "text": inner.working })),
                BatchWrite::new(META, CURSOR_DOC_ID, json!({ "index": inner.cursor })),
            ])
            .await?;

        inner.dirty = false;
        debug!(cursor = inner.cursor, "cursor flushed");
        Ok(())
    }

    /// The absolute index of the next character to be written.
    pub async fn cursor(&self) -> u64 {
        self.inner.lock().await.cursor
    }

    /// Number of chunks containing at least one character.
    pub async fn chunk_count(&self) -> u64 {
        let cursor = self.inner.lock().await.cursor;
        cursor.div_ceil(self.chunk_size as u64)
    }

    /// Read one chunk's text: the working chunk from RAM, finished chunks
    /// from the LRU or the backend. A chunk that does not exist yet reads
    /// as the empty string.
    pub async fn read_chunk(&self, id: u64) -> StoreResult<String> {
        {
            let mut inner = self.inner.lock().await;
            if id == inner.working_id {
                return Ok(inner.working.clone());
            }
            if id > inner.working_id {
                return Ok(String::new());
            }
            if let Some(text) = inner.lru.get(&id) {
                return Ok(text.to_string());
            }
        }

        // Cache miss; fetch without blocking the writer.
        let text = match self.backend.get(CHUNKS, &chunk_doc_id(id)).await? {
            Some(doc) => doc
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            None => String::new(),
        };

        let mut inner = self.inner.lock().await;
        // Only finished chunks are immutable enough to cache.
        if id < inner.working_id {
            inner.lru.put(id, Arc::from(text.as_str()));
        }
        Ok(text)
    }

    /// Read `len` characters starting at absolute index `start`. Returns a
    /// short (possibly empty) string when the request extends past the
    /// cursor.
    pub async fn read_slice(&self, start: u64, len: u32) -> StoreResult<String> {
        if len == 0 {
            return Ok(String::new());
        }

        let cursor = self.cursor().await;
        if start >= cursor {
            return Ok(String::new());
        }
        let end = (start + len as u64).min(cursor);

        let chunk_size = self.chunk_size as u64;
        let first = start / chunk_size;
        let last = (end - 1) / chunk_size;

        let mut text = String::with_capacity((end - start) as usize);
        for id in first..=last {
            text.push_str(&self.read_chunk(id).await?);
        }

        let offset = (start - first * chunk_size) as usize;
        let take = (end - start) as usize;
        Ok(text[offset..offset + take].to_string())
    }

    /// Stop the flusher and perform one final synchronous flush.
    pub async fn close(&self) -> StoreResult<()> {
        let flusher = self.flusher.lock().expect("flusher lock").take();
        if let Some(Flusher { stop, task }) = flusher {
            let _ = stop.send(true);
            let _ = task.await;
        }
        self.flush_cursor_tick().await?;
        info!("chunk store closed");
        Ok(())
    }
}
