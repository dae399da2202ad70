//! Shared state for the intake server

use crate::buffer::DispatchBuffer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State handed to every route handler
///
/// Cloned per request; both fields are cheap handle clones.
#[derive(Clone)]
pub struct AppState {
    /// Buffer that accepted submissions are offered to
    pub buffer: Arc<DispatchBuffer>,

    /// Pipeline shutdown signal; submissions are refused once it fires
    pub cancel: CancellationToken,
}

impl AppState {
    /// Create a new AppState
    pub fn new(buffer: Arc<DispatchBuffer>, cancel: CancellationToken) -> Self {
        Self { buffer, cancel }
    }
}
