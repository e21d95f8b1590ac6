//! WebSocket wire protocol
//!
//! JSON text frames tagged by `type`. The server emits `cursor` and
//! `init-words` once on connect, then live `char` and `word` events.
//! Clients send nothing.

use serde::Serialize;

use crate::engine::StreamEvent;
use crate::words::WordHit;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    Cursor { cursor: u64 },
    InitWords { words: Vec<WordHit> },
    Char { index: u64, ch: char },
    Word { start: u64, len: u32, word: String },
}

impl WireMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("wire message serializes")
    }
}

impl From<StreamEvent> for WireMessage {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Char { index, ch } => Self::Char { index, ch },
            StreamEvent::Word(WordHit { start, len, word }) => Self::Word { start, len, word },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_frame() {
        let json = WireMessage::Cursor { cursor: 42 }.to_json();
        assert_eq!(json, r#"{"type":"cursor","cursor":42}"#);
    }

    #[test]
    fn test_init_words_frame() {
        let json = WireMessage::InitWords {
            words: vec![WordHit {
                start: 101,
                len: 3,
                word: "cat".into(),
            }],
        }
        .to_json();
        assert_eq!(
            json,
            r#"{"type":"init-words","words":[{"start":101,"len":3,"word":"cat"}]}"#
        );
    }

    #[test]
    fn test_char_frame_from_event() {
        let msg = WireMessage::from(StreamEvent::Char { index: 7, ch: 'q' });
        assert_eq!(msg.to_json(), r#"{"type":"char","index":7,"ch":"q"}"#);
    }

    #[test]
    fn test_word_frame_from_event() {
        let msg = WireMessage::from(StreamEvent::Word(WordHit {
            start: 3,
            len: 4,
            word: "scat".into(),
        }));
        assert_eq!(msg.to_json(), r#"{"type":"word","start":3,"len":4,"word":"scat"}"#);
    }
}
