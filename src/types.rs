//! Core types for rippl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, StreamError};

/// Identifier of one submission, forwarded as-is to the download sink
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    /// Create a new SubmissionId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubmissionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SubmissionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<&str> for SubmissionId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A post observed on a source subscription
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Submission identifier (base36, without the `t3_` prefix)
    pub id: String,

    /// Post title; this is the text the content filter looks at
    pub title: String,

    /// Subreddit the post belongs to
    #[serde(default)]
    pub subreddit: String,

    /// Author name
    #[serde(default)]
    pub author: Option<String>,

    /// Relative permalink
    #[serde(default)]
    pub permalink: Option<String>,

    /// Link target of the post
    #[serde(default)]
    pub url: Option<String>,

    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Build a post from just an identifier and a title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A drained snapshot of the dispatch buffer, in insertion order
pub type Batch = Vec<SubmissionId>;

/// Lifecycle state of a stream worker
///
/// ```text
/// Starting ──ok──▶ Streaming ◀──record── Retrying
///    │                │  └──transient error──▶ │
///    └──fail──▶ Terminated ◀──fatal/cancel/closed┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Opening the subscription
    Starting,
    /// Receiving records
    Streaming,
    /// Last event was a transient transport error; waiting for the subscription to recover
    Retrying,
    /// Stopped for good
    Terminated,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Streaming => "streaming",
            WorkerState::Retrying => "retrying",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why a stream worker reached [`WorkerState::Terminated`]
#[derive(Debug)]
pub enum WorkerExit {
    /// The shared cancellation signal fired
    Cancelled,
    /// The subscription reported an error that will not heal
    Fatal(StreamError),
    /// The subscription could not be opened
    SubscribeFailed(Error),
    /// The subscription's record or error channel closed
    StreamClosed,
    /// The worker task panicked
    Panicked(String),
}

impl WorkerExit {
    /// Whether the worker stopped because of shutdown rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerExit::Cancelled)
    }
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::Cancelled => f.write_str("cancelled"),
            WorkerExit::Fatal(e) => write!(f, "fatal stream error: {e}"),
            WorkerExit::SubscribeFailed(e) => write!(f, "subscription failed: {e}"),
            WorkerExit::StreamClosed => f.write_str("stream closed"),
            WorkerExit::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// Counters kept by the dispatch buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Number of `offer` calls
    pub offered: u64,
    /// Offers that were admitted
    pub accepted: u64,
    /// Offers rejected because the buffer was full
    pub dropped: u64,
}

/// Events emitted while the pipeline runs
///
/// Subscribe through [`Supervisor::subscribe`](crate::Supervisor::subscribe).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A stream worker changed state
    WorkerState {
        /// Source the worker owns
        source: String,
        /// New state
        state: WorkerState,
    },

    /// A matching submission was dropped because the buffer was full
    Dropped {
        /// Source the submission came from
        source: String,
        /// Dropped identifier
        id: SubmissionId,
    },

    /// A batch was handed to the sink and the sink reported success
    BatchDispatched {
        /// Number of identifiers in the batch
        size: usize,
    },

    /// The sink reported failure for a batch; its identifiers are lost
    BatchFailed {
        /// Number of identifiers in the batch
        size: usize,
        /// Error message
        error: String,
    },

    /// The supervisor finished joining its workers
    Shutdown,
}
