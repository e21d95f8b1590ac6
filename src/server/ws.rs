//! WebSocket subscriber handling

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{SharedState, proto::WireMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let Ok(mut attached) = state.engine.attach().await else {
        debug!("ws connect refused: engine stopped");
        return;
    };

    debug!(cursor = attached.cursor, "ws subscriber attached");
    let (mut sink, mut stream) = socket.split();

    // Snapshot first: cursor, then the hits so far. The engine guarantees
    // every live event on `attached.events` has index >= cursor.
    let cursor = WireMessage::Cursor { cursor: attached.cursor };
    let init_words = WireMessage::InitWords {
        words: std::mem::take(&mut attached.words),
    };
    for msg in [cursor, init_words] {
        if sink.send(Message::Text(msg.to_json().into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = attached.events.recv() => match event {
                Ok(event) => {
                    let frame = WireMessage::from(event).to_json();
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // A subscriber this far behind has gaps either way;
                    // drop it so it reconnects and back-fills over REST.
                    warn!(missed, "ws subscriber lagged, disconnecting");
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                // Clients send nothing meaningful; tolerate pings and
                // stray frames, leave on close or error.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("ws subscriber detached");
}
