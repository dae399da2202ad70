//! # rippl
//!
//! Streams new posts from a set of subreddits, keeps the ones whose title
//! matches a filter, and hands their identifiers in batches to a download
//! sink.
//!
//! ## Pipeline
//!
//! - one [`StreamWorker`] per source polls the feed and offers matching
//!   identifiers to a shared [`DispatchBuffer`]
//! - the buffer is bounded; offers beyond its capacity are dropped, never
//!   blocked
//! - a single [`BatchDispatcher`] drains the buffer every period (or as soon as
//!   it fills) and passes each batch to a [`DownloadSink`] without waiting
//! - the [`Supervisor`] owns the shared cancellation token and joins the
//!   workers; a source that fails terminally does not affect the others
//!
//! ## Quick Start
//!
//! ```no_run
//! use rippl::{Config, Supervisor};
//! use rippl::source::RedditClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         sources: vec!["earthporn".to_string(), "wallpapers".to_string()],
//!         filter_terms: rippl::TermFilter::from_csv("4k,8k"),
//!         ..Default::default()
//!     };
//!
//!     let feed = Arc::new(RedditClient::new(&config.reddit)?);
//!     let sink = rippl::sink::from_config(&config.sink)?;
//!     let supervisor = Supervisor::new(&config, feed, sink)?;
//!
//!     // Subscribe to events
//!     let mut events = supervisor.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = rippl::run_until_signal(supervisor).await;
//!     for (source, exit) in &report.exits {
//!         println!("{source}: {exit}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Submission intake HTTP server
pub mod api;
/// Bounded dispatch buffer
pub mod buffer;
/// Configuration types
pub mod config;
/// Periodic batch dispatch
pub mod dispatcher;
/// Error types
pub mod error;
/// Title filtering
pub mod filter;
/// Download sinks
pub mod sink;
/// Upstream post sources
pub mod source;
/// Worker and dispatcher orchestration
pub mod supervisor;
/// Core types and events
pub mod types;
/// Per-source stream workers
pub mod worker;

pub use buffer::DispatchBuffer;
pub use config::{Config, HttpSinkMode, IntakeConfig, RedditConfig, RedditCredentials, SinkConfig};
pub use dispatcher::BatchDispatcher;
pub use error::{Error, Result, StreamError};
pub use filter::TermFilter;
pub use sink::DownloadSink;
pub use source::PostSource;
pub use supervisor::{Supervisor, SupervisorReport};
pub use types::{Batch, BufferStats, Event, Post, SubmissionId, WorkerExit, WorkerState};
pub use worker::{StreamWorker, WorkerContext};

/// Run the supervisor until it finishes or a shutdown signal arrives
///
/// Listens for SIGTERM and SIGINT on Unix and Ctrl+C elsewhere. On a signal
/// the supervisor's token is cancelled and the run is awaited to completion,
/// so the returned report always covers every worker.
///
/// # Example
///
/// ```no_run
/// use rippl::{Config, Supervisor, run_until_signal};
/// use rippl::source::RedditClient;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config {
///         sources: vec!["pics".to_string()],
///         ..Default::default()
///     };
///     let feed = Arc::new(RedditClient::new(&config.reddit)?);
///     let sink = rippl::sink::from_config(&config.sink)?;
///
///     run_until_signal(Supervisor::new(&config, feed, sink)?).await;
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(supervisor: Supervisor) -> SupervisorReport {
    let cancel = supervisor.cancel_token();
    let run = supervisor.run();
    tokio::pin!(run);

    tokio::select! {
        report = &mut run => return report,
        _ = wait_for_signal() => {}
    }

    tracing::info!("Shutting down");
    cancel.cancel();
    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handlers may fail to register in restricted environments
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
