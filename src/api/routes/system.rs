//! System handlers: health and buffer statistics

use super::BufferStatus;
use crate::api::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

/// GET /health - Health check
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /stats - Dispatch buffer status
pub async fn buffer_stats(State(state): State<AppState>) -> Json<BufferStatus> {
    Json(BufferStatus {
        len: state.buffer.len(),
        capacity: state.buffer.capacity(),
        stats: state.buffer.stats(),
    })
}
