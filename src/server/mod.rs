//! HTTP and WebSocket transport
//!
//! REST surface under `/v1` plus the live stream at `/ws`. The handlers
//! are thin: validation here, everything else through the engine handle
//! and the chunk store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use eyre::{Context, Result};
use serde_json::json;
use tracing::info;

use crate::engine::EngineHandle;
use crate::store::{CHUNK_SIZE, ChunkStore};

mod proto;
mod ws;

pub use proto::WireMessage;

/// Upper bound on a single `/v1/chars` request (16 chunks).
pub const MAX_SLICE_LEN: u32 = 16 * CHUNK_SIZE as u32;

pub struct AppState {
    pub engine: EngineHandle,
    pub store: Arc<ChunkStore>,
}

type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/status", get(get_status))
        .route("/v1/stats", get(get_stats))
        .route("/v1/chars", get(get_chars))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    addr: std::net::SocketAddr,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("failed to bind {addr}"))?;
    info!(%addr, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server error")
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

fn engine_gone() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "engine stopped" }))).into_response()
}

async fn get_status(State(state): State<SharedState>) -> Response {
    match state.engine.status().await {
        Ok(status) => Json(status).into_response(),
        Err(_) => engine_gone(),
    }
}

async fn get_stats(State(state): State<SharedState>) -> Response {
    match state.engine.status().await {
        Ok(status) => Json(json!({
            "users": status.users,
            "charsPerMinute": status.chars_per_minute,
        }))
        .into_response(),
        Err(_) => engine_gone(),
    }
}

/// Validate `start`/`len` query params for `/v1/chars`.
///
/// Rejects anything that is not a plain non-negative integer, a
/// non-positive length, or a length beyond [`MAX_SLICE_LEN`].
fn parse_chars_query(params: &HashMap<String, String>) -> Result<(u64, u32), &'static str> {
    let start: u64 = params
        .get("start")
        .ok_or("missing start")?
        .parse()
        .map_err(|_| "start must be a non-negative integer")?;

    let len: u32 = params
        .get("len")
        .ok_or("missing len")?
        .parse()
        .map_err(|_| "len must be a positive integer")?;

    if len == 0 {
        return Err("len must be positive");
    }
    if len > MAX_SLICE_LEN {
        return Err("len exceeds maximum slice size");
    }

    Ok((start, len))
}

async fn get_chars(State(state): State<SharedState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let (start, len) = match parse_chars_query(&params) {
        Ok(parsed) => parsed,
        Err(msg) => return bad_request(msg),
    };

    match state.store.read_slice(start, len).await {
        Ok(text) => text.into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
