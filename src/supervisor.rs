//! Supervisor: wires stream workers, the dispatch buffer and the dispatcher
//!
//! The supervisor owns the single [`CancellationToken`] every component
//! watches. [`Supervisor::run`] returns once every stream worker has
//! terminated; failed workers are never restarted.

use crate::buffer::DispatchBuffer;
use crate::config::Config;
use crate::dispatcher::BatchDispatcher;
use crate::error::Result;
use crate::filter::TermFilter;
use crate::sink::DownloadSink;
use crate::source::PostSource;
use crate::types::{BufferStats, Event, WorkerExit};
use crate::worker::{StreamWorker, WorkerContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Outcome of a supervisor run
#[derive(Debug)]
pub struct SupervisorReport {
    /// Why each source's worker stopped, in configuration order
    pub exits: Vec<(String, WorkerExit)>,
    /// Buffer counters at shutdown
    pub stats: BufferStats,
}

impl SupervisorReport {
    /// Sources whose worker stopped for a reason other than shutdown
    pub fn failed_sources(&self) -> impl Iterator<Item = &str> {
        self.exits
            .iter()
            .filter(|(_, exit)| !exit.is_cancelled())
            .map(|(source, _)| source.as_str())
    }
}

/// Runs one stream worker per source plus the batch dispatcher
///
/// # Examples
///
/// ```no_run
/// use rippl::{Config, Supervisor};
/// use rippl::source::RedditClient;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config {
///     sources: vec!["pics".into(), "aww".into()],
///     ..Default::default()
/// };
/// let feed = Arc::new(RedditClient::new(&config.reddit)?);
/// let sink = rippl::sink::from_config(&config.sink)?;
///
/// let supervisor = Supervisor::new(&config, feed, sink)?;
/// let mut events = supervisor.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// let report = rippl::run_until_signal(supervisor).await;
/// println!("dropped {} submissions", report.stats.dropped);
/// # Ok(())
/// # }
/// ```
pub struct Supervisor {
    sources: Vec<String>,
    filter: Arc<TermFilter>,
    buffer: Arc<DispatchBuffer>,
    feed: Arc<dyn PostSource>,
    sink: Arc<dyn DownloadSink>,
    poll_interval: Duration,
    dispatch_period: Duration,
    eager_dispatch: bool,
    shutdown_grace: Duration,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Build a supervisor from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// fails validation.
    pub fn new(
        config: &Config,
        feed: Arc<dyn PostSource>,
        sink: Arc<dyn DownloadSink>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            sources: config.source_names(),
            filter: Arc::new(config.filter_terms.clone()),
            buffer: Arc::new(DispatchBuffer::new(config.buffer_capacity)?),
            feed,
            sink,
            poll_interval: config.poll_interval(),
            dispatch_period: config.dispatch_period(),
            eager_dispatch: config.eager_dispatch,
            shutdown_grace: config.shutdown_grace,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Shared dispatch buffer, for additional producers such as the intake API
    pub fn buffer(&self) -> Arc<DispatchBuffer> {
        self.buffer.clone()
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the whole pipeline when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown; calling this more than once has no further effect
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Shutdown requested");
            self.cancel.cancel();
        }
    }

    /// Run every worker and the dispatcher until all workers have terminated
    pub async fn run(self) -> SupervisorReport {
        tracing::info!(
            sources = ?self.sources,
            feed = self.feed.name(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            dispatch_period_ms = self.dispatch_period.as_millis() as u64,
            buffer_capacity = self.buffer.capacity(),
            "Starting supervisor"
        );

        // Separate token: the dispatcher's final drain must run after every
        // worker has stopped offering.
        let dispatcher_cancel = CancellationToken::new();
        let dispatcher = BatchDispatcher::new(
            self.buffer.clone(),
            self.sink.clone(),
            self.dispatch_period,
            self.event_tx.clone(),
        )
        .with_eager(self.eager_dispatch);
        let tracker = dispatcher.tracker();
        let dispatcher_handle = tokio::spawn(dispatcher.run(dispatcher_cancel.clone()));

        let ctx = WorkerContext {
            feed: self.feed.clone(),
            filter: self.filter.clone(),
            buffer: self.buffer.clone(),
            interval: self.poll_interval,
            event_tx: self.event_tx.clone(),
            cancel: self.cancel.clone(),
        };
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let worker = StreamWorker::new(source.clone(), ctx.clone());
                (source.clone(), tokio::spawn(worker.run()))
            })
            .collect();

        let mut exits = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let exit = match handle.await {
                Ok(exit) => exit,
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Stream worker task failed");
                    WorkerExit::Panicked(e.to_string())
                }
            };
            exits.push((source, exit));
        }

        if !self.cancel.is_cancelled() {
            tracing::warn!("All stream workers terminated, stopping dispatcher");
        }
        dispatcher_cancel.cancel();
        if let Err(e) = dispatcher_handle.await {
            tracing::error!(error = %e, "Batch dispatcher task failed");
            tracker.close();
        }

        match tokio::time::timeout(self.shutdown_grace, tracker.wait()).await {
            Ok(()) => tracing::debug!("All sink calls completed"),
            Err(_) => tracing::warn!(
                in_flight = tracker.len(),
                grace_secs = self.shutdown_grace.as_secs(),
                "Timed out waiting for sink calls, abandoning them"
            ),
        }

        let stats = self.buffer.stats();
        self.event_tx.send(Event::Shutdown).ok();
        tracing::info!(
            offered = stats.offered,
            accepted = stats.accepted,
            dropped = stats.dropped,
            "Supervisor stopped"
        );

        SupervisorReport { exits, stats }
    }
}
