//! monkeyd - Typewriting Monkey Streaming Daemon
//!
//! A deterministic pseudo-random stream of lowercase letters is generated
//! at a rate proportional to the number of connected viewers, persisted
//! in fixed-size chunks over a document backend, scanned for dictionary
//! words, and multicast live to WebSocket subscribers. Any historical
//! slice of the stream can be read back over REST.
//!
//! # Core Properties
//!
//! - **Deterministic forever**: the character at index `n` is a pure
//!   function of `n`; restarts resume the exact same stream
//! - **Single writer**: one engine task owns the cursor, the working
//!   chunk, the detector window, and the hit list
//! - **Durable by batch**: the cursor and the working chunk are persisted
//!   together, so recovery never sees one without the other
//! - **Reconciled on startup**: word hits lost between flushes are
//!   re-detected before any subscriber attaches
//!
//! # Modules
//!
//! - [`backend`] - document backend trait and implementations
//! - [`store`] - chunked append-only character storage
//! - [`generator`] - counter-based deterministic letter source
//! - [`words`] - dictionary, detector, hit store, startup scanner
//! - [`engine`] - the pacing/broadcast actor tying it all together
//! - [`server`] - HTTP + WebSocket transport
//! - [`config`] / [`cli`] / [`daemon`] - process plumbing

pub mod backend;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod generator;
pub mod server;
pub mod store;
pub mod words;

// Re-export commonly used types
pub use backend::{Backend, BackendError, BatchWrite, DocumentBackend, FileBackend, MemoryBackend};
pub use config::{Config, HttpConfig, StorageConfig, StreamConfig};
pub use engine::{Attached, EngineConfig, EngineHandle, EngineStatus, StreamEngine, StreamEvent};
pub use generator::{Monkey, STREAM_SEED, letter_at};
pub use store::{CHUNK_SIZE, ChunkStore, ChunkStoreConfig, StoreError};
pub use words::{Dictionary, WordDetector, WordHit, WordStore, WordsError, scan_gap};
