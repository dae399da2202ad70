//! Route handlers for the intake API
//!
//! - [`intake`]: submission intake
//! - [`system`]: health and buffer statistics

use crate::types::{BufferStats, SubmissionId};
use serde::{Deserialize, Serialize};

mod intake;
mod system;

pub use intake::*;
pub use system::*;

/// Body of `POST /`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DownloadRequest {
    /// Submission to queue for download
    pub submission_id: SubmissionId,
}

/// Body of `GET /stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BufferStatus {
    /// Identifiers currently buffered
    pub len: usize,
    /// Buffer capacity
    pub capacity: usize,
    /// Lifetime offer counters
    #[serde(flatten)]
    pub stats: BufferStats,
}
