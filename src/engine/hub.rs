//! Broadcast hub for stream events
//!
//! Fan-out uses a tokio broadcast channel: every subscriber receives all
//! events emitted after it subscribed, in emission order. Dropping the
//! receiver is disconnect; the subscriber count is the receiver count.

use tokio::sync::broadcast;

use crate::words::WordHit;

/// Buffered events per subscriber. At peak throughput (~30 chars/s) this
/// is several minutes of slack before a slow client lags out.
pub const HUB_CAPACITY: usize = 8192;

/// Everything the stream publishes.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A character was appended at `index`.
    Char { index: u64, ch: char },
    /// A dictionary word was detected.
    Word(WordHit),
}

pub struct Hub {
    tx: broadcast::Sender<StreamEvent>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget: no subscribers is fine.
    pub fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let hub = Hub::default();
        hub.emit(StreamEvent::Char { index: 0, ch: 'a' });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_in_order() {
        let hub = Hub::default();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.emit(StreamEvent::Char { index: 0, ch: 'c' });
        hub.emit(StreamEvent::Char { index: 1, ch: 'a' });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                StreamEvent::Char { index, ch } => {
                    assert_eq!((index, ch), (0, 'c'));
                }
                other => panic!("unexpected event: {:?}", other),
            }
            match rx.recv().await.unwrap() {
                StreamEvent::Char { index, ch } => {
                    assert_eq!((index, ch), (1, 'a'));
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_drop_decrements_subscriber_count() {
        let hub = Hub::default();
        let rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
