use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub armed_timers: usize,
    pub pending_uploads: usize,
    pub status: String,
    pub version: String,
}

/// Route: GET /_internal/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        armed_timers: state.lifecycle.scheduler().armed(),
        pending_uploads: state.lifecycle.assembler().pending_count(),
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
