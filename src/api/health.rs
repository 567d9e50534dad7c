//! Health and status endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Buffering status
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Conversations currently buffering
    pub pending_conversations: usize,
    /// Flush timers waiting to fire
    pub armed_timers: usize,
    pub text_delay_secs: u64,
    pub file_delay_secs: u64,
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let policy = state.gateway.scheduler().policy();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_conversations: state.gateway.pending_conversations(),
        armed_timers: state.gateway.armed_timers(),
        text_delay_secs: policy.text_delay.as_secs(),
        file_delay_secs: policy.file_delay.as_secs(),
    })
}

/// Build health router (liveness only, no state needed)
#[must_use]
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build status router
#[must_use]
pub fn status_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .with_state(state)
}
