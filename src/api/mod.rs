//! Submission intake server
//!
//! Lets other services queue submissions alongside the stream workers by
//! POSTing `{"submission_id": "<id>"}` to the root path. Accepted identifiers
//! go into the same [`DispatchBuffer`] and leave with the next batch.

use crate::buffer::DispatchBuffer;
use crate::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the intake router
///
/// # Routes
///
/// - `POST /` - Queue a submission (`202`, `400`, `422` or `503`)
/// - `GET /health` - Health check
/// - `GET /stats` - Buffer length, capacity and counters
///
/// Any other method on `/` is answered with `405 Method Not Allowed`.
pub fn create_router(buffer: Arc<DispatchBuffer>, cancel: CancellationToken) -> Router {
    let state = AppState::new(buffer, cancel);

    Router::new()
        .route("/", post(routes::submit))
        .route("/health", get(routes::health_check))
        .route("/stats", get(routes::buffer_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the intake API on `bind_address` until `cancel` fires
///
/// # Example
///
/// ```no_run
/// use rippl::buffer::DispatchBuffer;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let buffer = Arc::new(DispatchBuffer::new(10)?);
/// let cancel = CancellationToken::new();
///
/// rippl::api::start_intake_server("127.0.0.1:6984".parse()?, buffer, cancel).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn start_intake_server(
    bind_address: SocketAddr,
    buffer: Arc<DispatchBuffer>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!(address = %bind_address, "Starting intake server");

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    serve(listener, buffer, cancel).await
}

/// Serve the intake API on an already bound listener
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    buffer: Arc<DispatchBuffer>,
    cancel: CancellationToken,
) -> Result<()> {
    let address = listener.local_addr().map_err(crate::error::Error::Io)?;
    let app = create_router(buffer, cancel.clone());

    tracing::info!(address = %address, "Intake server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("Intake server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
