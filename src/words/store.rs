//! Persistent word hit store
//!
//! Hits are buffered and written in batches: immediately once the buffer
//! reaches `WORD_BATCH_SIZE`, otherwise by a coalescing timer task.
//! Document ids are a pure function of `(start, len)`, so replays and
//! restart reconciliation collapse to the same documents.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BatchWrite, WORDS, word_doc_id};

use super::{WordHit, WordsResult};

/// Pending hits that force an immediate flush.
pub const WORD_BATCH_SIZE: usize = 16;
/// Coalescing interval for the timer flush.
pub const WORD_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

struct Inner {
    pending: Vec<WordHit>,
    /// One past the end of the latest hit ever enqueued or loaded.
    /// Monotonically non-decreasing.
    high_water: u64,
}

struct Flusher {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct WordStore {
    backend: Backend,
    inner: Mutex<Inner>,
    flusher: std::sync::Mutex<Option<Flusher>>,
}

impl WordStore {
    /// Create the store and start its coalescing flusher.
    pub fn create(backend: Backend, flush_interval: Duration) -> Arc<Self> {
        let store = Arc::new(Self {
            backend,
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                high_water: 0,
            }),
            flusher: std::sync::Mutex::new(None),
        });

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let flusher_store = Arc::clone(&store);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = flusher_store.flush().await {
                            warn!(error = %e, "word flush failed, retrying next tick");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("word store flusher stopped");
        });
        *store.flusher.lock().expect("flusher lock") = Some(Flusher { stop: stop_tx, task });

        store
    }

    /// Read every persisted hit, sorted by `start` ascending, and seed the
    /// high-water mark from the latest one.
    pub async fn load_all(&self) -> WordsResult<Vec<WordHit>> {
        let docs = self.backend.list(WORDS).await?;

        let mut hits = Vec::with_capacity(docs.len());
        for (id, doc) in docs {
            match serde_json::from_value::<WordHit>(doc) {
                Ok(hit) => hits.push(hit),
                Err(e) => warn!(doc_id = %id, error = %e, "skipping malformed word document"),
            }
        }
        hits.sort_by_key(|h| (h.start, h.len));

        let high_water = hits.iter().map(WordHit::end).max().unwrap_or(0);
        {
            let mut inner = self.inner.lock().await;
            inner.high_water = inner.high_water.max(high_water);
        }

        info!(count = hits.len(), high_water, "word store loaded");
        Ok(hits)
    }

    /// Enqueue a hit for persistence. Flushes inline when the batch fills;
    /// a failed inline flush is logged and retried by the timer.
    pub async fn add(&self, hit: WordHit) {
        let full = {
            let mut inner = self.inner.lock().await;
            inner.high_water = inner.high_water.max(hit.end());
            inner.pending.push(hit);
            inner.pending.len() >= WORD_BATCH_SIZE
        };

        if full && let Err(e) = self.flush().await {
            warn!(error = %e, "batch-full word flush failed, hits retained");
        }
    }

    /// Write all pending hits as one atomic batch. Pending hits are kept
    /// on failure so the timer can retry.
    pub async fn flush(&self) -> WordsResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.pending.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp_millis();
        let writes = inner
            .pending
            .iter()
            .map(|hit| {
                BatchWrite::new(
                    WORDS,
                    word_doc_id(hit.start, hit.len),
                    json!({
                        "start": hit.start,
                        "len": hit.len,
                        "word": hit.word,
                        "timestamp": now,
                    }),
                )
            })
            .collect();

        self.backend.batch(writes).await?;
        debug!(count = inner.pending.len(), "word hits persisted");
        inner.pending.clear();
        Ok(())
    }

    /// One past the end of the latest known hit (0 when none).
    pub async fn high_water(&self) -> u64 {
        self.inner.lock().await.high_water
    }

    /// Stop the flusher and write out whatever is still pending.
    pub async fn close(&self) -> WordsResult<()> {
        let flusher = self.flusher.lock().expect("flusher lock").take();
        if let Some(Flusher { stop, task }) = flusher {
            let _ = stop.send(true);
            let _ = task.await;
        }
        self.flush().await?;
        info!("word store closed");
        Ok(())
    }
}
