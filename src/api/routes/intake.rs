//! Submission intake handler

use super::DownloadRequest;
use crate::api::AppState;
use crate::error::{ApiError, Error};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::error::Category;

/// POST / - Queue a submission for download
///
/// Accepts `{"submission_id": "<id>"}` regardless of content type.
///
/// - `202 Accepted` once the identifier is buffered
/// - `400 Bad Request` if the body is not JSON
/// - `422 Unprocessable Entity` if the JSON has the wrong shape
/// - `503 Service Unavailable` if the buffer is full or shutdown has begun
pub async fn submit(State(state): State<AppState>, body: Bytes) -> Response {
    let request: DownloadRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Could not parse submission request");
            return match e.classify() {
                Category::Data => Error::Serialization(e).into_response(),
                _ => ApiError::validation(e.to_string()).into_response(),
            };
        }
    };

    if state.cancel.is_cancelled() {
        return Error::ShuttingDown.into_response();
    }

    let id = request.submission_id;
    match state.buffer.offer(id.clone()) {
        Ok(()) => {
            tracing::info!(submission_id = %id, "Accepted submission");
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "submission_id": id }))).into_response()
        }
        Err(e) => {
            tracing::warn!(submission_id = %id, error = %e, "Rejected submission");
            e.into_response()
        }
    }
}
