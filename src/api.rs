// src/api.rs
// Operational HTTP surface: a JSON status snapshot for periodic scraping
// and an ingress for reconfiguration messages when no external pub/sub is
// wired in. Not a hard API contract; observability only.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::handler::{FilterStats, StorageHandler};
use crate::monitor::StreamsMonitor;
use crate::reconfig::CollectionMessage;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<StorageHandler>,
    pub monitor: Arc<StreamsMonitor>,
    pub reconfig_tx: mpsc::Sender<CollectionMessage>,
}

#[derive(Serialize)]
struct StatusResponse {
    queue_depth: usize,
    handled: u64,
    filtered: u64,
    dropped: u64,
    storages: Vec<crate::fanout::StorageHealth>,
    filters: Vec<FilterStats>,
    streams: Vec<StreamStatus>,
}

#[derive(Serialize)]
struct StreamStatus {
    id: String,
    feeds: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/reconfig", post(reconfig))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.handler.stats();
    let streams = state
        .monitor
        .feed_counts()
        .into_iter()
        .map(|(id, feeds)| StreamStatus { id, feeds })
        .collect();

    Json(StatusResponse {
        queue_depth: stats.queue_depth,
        handled: stats.handled,
        filtered: stats.filtered,
        dropped: stats.dropped,
        storages: stats.storages,
        filters: stats.filters,
        streams,
    })
}

async fn reconfig(
    State(state): State<AppState>,
    Json(msg): Json<CollectionMessage>,
) -> StatusCode {
    match state.reconfig_tx.send(msg).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::warn!(error = ?e, "reconfiguration channel closed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
