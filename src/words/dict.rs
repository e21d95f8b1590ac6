//! Dictionary loading

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use super::{MAX_WORD_LEN, MIN_WORD_LEN, WordsError, WordsResult};

/// An immutable set of lowercase words, loaded once at startup.
///
/// Entries outside `[MIN_WORD_LEN, MAX_WORD_LEN]` or containing anything
/// but lowercase ASCII letters are dropped on load.
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    /// Load from a newline-delimited word file. Missing or unreadable
    /// files are fatal to startup.
    pub fn load(path: impl AsRef<Path>) -> WordsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WordsError::DictionaryLoad {
            path: path.display().to_string(),
            source,
        })?;

        let dict = Self::from_words(text.lines().map(|l| l.trim().to_ascii_lowercase()));
        info!(path = %path.display(), size = dict.len(), "dictionary loaded");
        Ok(dict)
    }

    /// Build from an iterator of candidate words (tests use this).
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = words
            .into_iter()
            .map(Into::into)
            .filter(|w| {
                (MIN_WORD_LEN..=MAX_WORD_LEN).contains(&w.len()) && w.bytes().all(|b| b.is_ascii_lowercase())
            })
            .collect();
        Self { words }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
