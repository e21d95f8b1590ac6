//! Dictionary word detection and persistence
//!
//! A sliding-window detector recognizes the longest dictionary word
//! ending at each generated character; hits are persisted in coalesced
//! batches and reconciled across restarts by the startup scanner.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod detector;
mod dict;
mod scanner;
mod store;

pub use detector::WordDetector;
pub use dict::Dictionary;
pub use scanner::scan_gap;
pub use store::{WORD_BATCH_SIZE, WORD_FLUSH_INTERVAL, WordStore};

/// Shortest word worth reporting.
pub const MIN_WORD_LEN: usize = 3;
/// Longest word the detector can see; also the scanner's left context + 1.
pub const MAX_WORD_LEN: usize = 12;

/// Errors from word detection and persistence
#[derive(Debug, Error)]
pub enum WordsError {
    #[error("failed to load dictionary from {path}: {source}")]
    DictionaryLoad {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Backend(#[from] crate::backend::BackendError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

pub type WordsResult<T> = Result<T, WordsError>;

/// A dictionary word found in the stream.
///
/// `(start, len)` is the identity: the substring of the stream at
/// `[start, start + len)` equals `word`, forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordHit {
    pub start: u64,
    pub len: u32,
    pub word: String,
}

impl WordHit {
    /// One past the last character of the hit.
    pub fn end(&self) -> u64 {
        self.start + self.len as u64
    }
}
