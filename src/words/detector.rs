//! Sliding-window longest-match detector

use std::sync::Arc;

use super::{Dictionary, MAX_WORD_LEN, MIN_WORD_LEN, WordHit};

/// Recognizes the longest dictionary word ending at each pushed
/// character. Holds no cursor; the caller supplies absolute positions.
pub struct WordDetector {
    dict: Arc<Dictionary>,
    /// Last `MAX_WORD_LEN` characters, oldest first. ASCII only.
    window: Vec<u8>,
}

impl WordDetector {
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self {
            dict,
            window: Vec::with_capacity(MAX_WORD_LEN),
        }
    }

    /// Push the character at absolute stream position `pos`. Returns the
    /// longest dictionary word ending at `pos`, if any. At most one hit
    /// per push; hits from successive pushes may overlap.
    pub fn push(&mut self, ch: char, pos: u64) -> Option<WordHit> {
        if self.window.len() == MAX_WORD_LEN {
            self.window.remove(0);
        }
        self.window.push(ch as u8);

        let len = self.window.len();
        let longest = MAX_WORD_LEN.min(len);
        for n in (MIN_WORD_LEN..=longest).rev() {
            let suffix = std::str::from_utf8(&self.window[len - n..]).expect("ascii window");
            if self.dict.contains(suffix) {
                return Some(WordHit {
                    start: pos + 1 - n as u64,
                    len: n as u32,
                    word: suffix.to_string(),
                });
            }
        }
        None
    }
}
