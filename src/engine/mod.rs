//! Streaming engine
//!
//! The single logical writer of the stream: one actor task that paces the
//! generator by subscriber count, appends to the chunk store, feeds the
//! word detector, and fans events out through the broadcast hub. Attach
//! requests are served on the same select loop, so a subscriber's cursor
//! snapshot is always consistent with the first live event it receives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::generator::Monkey;
use crate::store::ChunkStore;
use crate::words::{Dictionary, MAX_WORD_LEN, WordDetector, WordHit, WordStore, scan_gap};

mod hub;
mod pacer;

pub use hub::{HUB_CAPACITY, Hub, StreamEvent};
pub use pacer::Pacer;

/// Generation tick period (60 Hz).
pub const STEP: Duration = Duration::from_micros(16_667);
/// Nominal characters per minute contributed by each online user.
pub const CPM_PER_USER: f64 = 5.0;
/// Synthetic audience added while test mode is on.
pub const BASELINE_USERS: usize = 250;

/// Engine tuning; everything the loop needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub seed: u64,
    pub step: Duration,
    pub cpm_per_user: f64,
    /// Adds `BASELINE_USERS` synthetic viewers when set.
    pub test_mode: bool,
    /// Test-injectable offset on the online-user count.
    pub user_jitter: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: crate::generator::STREAM_SEED,
            step: STEP,
            cpm_per_user: CPM_PER_USER,
            test_mode: true,
            user_jitter: 0,
        }
    }
}

/// Snapshot handed to a new subscriber.
pub struct Attached {
    /// Index of the next character; the first live `Char` event this
    /// subscriber receives has `index >= cursor`.
    pub cursor: u64,
    /// All hits known so far, in detection order.
    pub words: Vec<WordHit>,
    pub events: broadcast::Receiver<StreamEvent>,
}

/// Point-in-time engine state for the status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub cursor: u64,
    pub chunks: u64,
    pub dictionary_size: usize,
    pub users: usize,
    pub chars_per_minute: f64,
    pub uptime_sec: u64,
    pub halted: bool,
}

enum EngineRequest {
    Attach { reply: oneshot::Sender<Attached> },
    Status { reply: oneshot::Sender<EngineStatus> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cloneable handle for talking to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Subscribe: snapshot + live event receiver, race-free.
    pub async fn attach(&self) -> Result<Attached> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Attach { reply })
            .await
            .map_err(|_| eyre::eyre!("engine stopped"))?;
        rx.await.map_err(|_| eyre::eyre!("engine stopped"))
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply })
            .await
            .map_err(|_| eyre::eyre!("engine stopped"))?;
        rx.await.map_err(|_| eyre::eyre!("engine stopped"))
    }

    /// Stop generation and close both stores. Idempotent from the
    /// caller's view: a second call errors harmlessly.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Shutdown { reply })
            .await
            .map_err(|_| eyre::eyre!("engine stopped"))?;
        rx.await.map_err(|_| eyre::eyre!("engine stopped"))
    }
}

/// The streaming engine actor. Built by [`StreamEngine::bootstrap`],
/// consumed by [`StreamEngine::run`] on its own task.
pub struct StreamEngine {
    config: EngineConfig,
    store: Arc<ChunkStore>,
    word_store: Arc<WordStore>,
    dictionary_size: usize,
    hub: Hub,
    monkey: Monkey,
    detector: WordDetector,
    hits: Vec<WordHit>,
    pacer: Pacer,
    halted: bool,
    started_at: Instant,
    tx: mpsc::Sender<EngineRequest>,
    rx: mpsc::Receiver<EngineRequest>,
}

impl StreamEngine {
    /// Reconcile state after (re)start: load persisted hits, re-detect the
    /// gap between the word high-water mark and the cursor, warm the
    /// detector window, and position the generator at the cursor.
    ///
    /// Any failure here is fatal; the engine refuses to serve subscribers
    /// from unreconciled state.
    pub async fn bootstrap(
        store: Arc<ChunkStore>,
        word_store: Arc<WordStore>,
        dict: Arc<Dictionary>,
        config: EngineConfig,
    ) -> Result<Self> {
        let cursor = store.cursor().await;

        let mut hits = word_store.load_all().await?;
        let high_water = word_store.high_water().await;

        let missing = scan_gap(&store, Arc::clone(&dict), high_water, cursor, crate::store::CHUNK_SIZE as u32).await?;
        if !missing.is_empty() {
            info!(count = missing.len(), "recovered unpersisted word hits");
        }
        for hit in &missing {
            word_store.add(hit.clone()).await;
        }
        hits.extend(missing);
        hits.sort_by_key(|h| (h.start, h.len));
        hits.dedup_by_key(|h| (h.start, h.len));

        // Warm the detector with the tail of the stream so a word spanning
        // the restart boundary is still recognized. Hits re-emitted during
        // warm-up end at or before the cursor and are already accounted for.
        let mut detector = WordDetector::new(dict.clone());
        let warm_start = cursor.saturating_sub(MAX_WORD_LEN as u64 - 1);
        let tail = store.read_slice(warm_start, (cursor - warm_start) as u32).await?;
        for (i, ch) in tail.chars().enumerate() {
            let _ = detector.push(ch, warm_start + i as u64);
        }

        let (tx, rx) = mpsc::channel(64);

        info!(cursor, hits = hits.len(), "engine bootstrapped");

        Ok(Self {
            config: config.clone(),
            store,
            word_store,
            dictionary_size: dict.len(),
            hub: Hub::default(),
            monkey: Monkey::new(config.seed, cursor),
            detector,
            hits,
            pacer: Pacer::new(),
            halted: false,
            started_at: Instant::now(),
            tx,
            rx,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle { tx: self.tx.clone() }
    }

    fn users_online(&self) -> usize {
        let baseline = if self.config.test_mode { BASELINE_USERS } else { 0 };
        let raw = self.hub.subscriber_count() as i64 + baseline as i64 + self.config.user_jitter;
        raw.max(0) as usize
    }

    /// Generate, persist and publish one character.
    async fn emit_one(&mut self) -> Result<(), crate::store::StoreError> {
        let ch = self.monkey.next();
        let index = self.store.append(ch).await?;
        self.hub.emit(StreamEvent::Char { index, ch });

        if let Some(hit) = self.detector.push(ch, index) {
            debug!(start = hit.start, word = %hit.word, "word detected");
            self.hits.push(hit.clone());
            self.hub.emit(StreamEvent::Word(hit.clone()));
            self.word_store.add(hit).await;
        }
        Ok(())
    }

    /// Run until shutdown. Consumes the engine; spawn on its own task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.step);
        info!("engine started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.halted {
                        continue;
                    }
                    let users = self.users_online();
                    let cps = users as f64 * self.config.cpm_per_user / 60.0;
                    let due = self.pacer.take(cps, self.config.step.as_secs_f64());
                    for _ in 0..due {
                        if let Err(e) = self.emit_one().await {
                            // A failed rollover means a character cannot be
                            // durably committed; stop generating.
                            error!(error = %e, "fatal store failure, generation halted");
                            self.halted = true;
                            break;
                        }
                    }
                }
                req = self.rx.recv() => match req {
                    Some(EngineRequest::Attach { reply }) => {
                        let attached = Attached {
                            cursor: self.store.cursor().await,
                            words: self.hits.clone(),
                            events: self.hub.subscribe(),
                        };
                        let _ = reply.send(attached);
                    }
                    Some(EngineRequest::Status { reply }) => {
                        let users = self.users_online();
                        let status = EngineStatus {
                            cursor: self.store.cursor().await,
                            chunks: self.store.chunk_count().await,
                            dictionary_size: self.dictionary_size,
                            users,
                            chars_per_minute: users as f64 * self.config.cpm_per_user,
                            uptime_sec: self.started_at.elapsed().as_secs(),
                            halted: self.halted,
                        };
                        let _ = reply.send(status);
                    }
                    Some(EngineRequest::Shutdown { reply }) => {
                        info!("engine shutting down");
                        if let Err(e) = self.word_store.close().await {
                            warn!(error = %e, "word store close failed");
                        }
                        if let Err(e) = self.store.close().await {
                            warn!(error = %e, "chunk store close failed");
                        }
                        let _ = reply.send(());
                        break;
                    }
                    None => break,
                },
            }
        }

        info!("engine stopped");
    }
}
