//! Per-source stream worker
//!
//! Each worker owns one subscription. Matching posts are offered to the shared
//! [`DispatchBuffer`]; transient transport errors are logged and reading
//! continues, terminal ones stop the worker for good.

use crate::buffer::DispatchBuffer;
use crate::error::Error;
use crate::filter::TermFilter;
use crate::source::{PostSource, SubscribeOptions, Subscription, SubscriptionEvent};
use crate::types::{Event, Post, SubmissionId, WorkerExit, WorkerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every stream worker
#[derive(Clone)]
pub struct WorkerContext {
    /// Feed provider
    pub feed: Arc<dyn PostSource>,
    /// Filter applied to post titles
    pub filter: Arc<TermFilter>,
    /// Buffer matching identifiers are offered to
    pub buffer: Arc<DispatchBuffer>,
    /// Poll interval passed to the subscription
    pub interval: Duration,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Shared shutdown signal
    pub cancel: CancellationToken,
}

/// Streams one source into the dispatch buffer until cancelled or failed
pub struct StreamWorker {
    source: String,
    ctx: WorkerContext,
    state: WorkerState,
}

impl StreamWorker {
    /// Create a worker for `source`
    pub fn new(source: impl Into<String>, ctx: WorkerContext) -> Self {
        Self {
            source: source.into(),
            ctx,
            state: WorkerState::Starting,
        }
    }

    /// Run until cancellation or a terminal error
    ///
    /// The worker never restarts itself; the returned [`WorkerExit`] says why
    /// it stopped.
    pub async fn run(mut self) -> WorkerExit {
        self.transition(WorkerState::Starting);

        let options = SubscribeOptions::new(self.ctx.interval);
        let opened = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => None,
            result = self.ctx.feed.subscribe(&self.source, options) => Some(result),
        };

        let exit = match opened {
            None => WorkerExit::Cancelled,
            Some(Err(e)) => {
                tracing::error!(source = %self.source, error = %e, "Failed to open subscription");
                WorkerExit::SubscribeFailed(e)
            }
            Some(Ok(subscription)) => {
                tracing::info!(
                    source = %self.source,
                    feed = self.ctx.feed.name(),
                    "Subscribed to source"
                );
                self.transition(WorkerState::Streaming);
                self.stream(subscription).await
            }
        };

        self.transition(WorkerState::Terminated);
        match &exit {
            WorkerExit::Cancelled => {
                tracing::debug!(source = %self.source, "Stream worker cancelled")
            }
            other => tracing::warn!(source = %self.source, reason = %other, "Stream worker terminated"),
        }
        exit
    }

    async fn stream(&mut self, mut subscription: Subscription) -> WorkerExit {
        let exit = loop {
            // Cancellation wins over a ready record so nothing is offered after shutdown.
            let event = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break WorkerExit::Cancelled,
                event = subscription.next() => event,
            };

            match event {
                None => break WorkerExit::StreamClosed,
                Some(SubscriptionEvent::Post(post)) => {
                    self.transition(WorkerState::Streaming);
                    self.handle_post(post);
                }
                Some(SubscriptionEvent::Error(e)) if e.is_terminal() => {
                    tracing::error!(source = %self.source, error = %e, "Terminal stream error");
                    break WorkerExit::Fatal(e);
                }
                Some(SubscriptionEvent::Error(e)) => {
                    tracing::warn!(source = %self.source, error = %e, "Transient stream error");
                    self.transition(WorkerState::Retrying);
                }
            }
        };

        subscription.stop();
        exit
    }

    fn handle_post(&self, post: Post) {
        if !self.ctx.filter.matches(&post.title) {
            tracing::trace!(source = %self.source, post_id = %post.id, "Post did not match filter");
            return;
        }

        let id = SubmissionId::new(post.id);
        match self.ctx.buffer.offer(id.clone()) {
            Ok(()) => {
                tracing::debug!(source = %self.source, submission_id = %id, "Queued submission");
            }
            Err(Error::BufferFull { capacity }) => {
                tracing::warn!(
                    source = %self.source,
                    submission_id = %id,
                    capacity,
                    "Dispatch buffer full, dropping submission"
                );
                self.ctx
                    .event_tx
                    .send(Event::Dropped {
                        source: self.source.clone(),
                        id,
                    })
                    .ok();
            }
            Err(e) => {
                tracing::warn!(source = %self.source, submission_id = %id, error = %e, "Failed to queue submission");
            }
        }
    }

    fn transition(&mut self, state: WorkerState) {
        if self.state == state && state != WorkerState::Starting {
            return;
        }
        self.state = state;
        tracing::debug!(source = %self.source, state = %state, "Stream worker state changed");
        self.ctx
            .event_tx
            .send(Event::WorkerState {
                source: self.source.clone(),
                state,
            })
            .ok();
    }
}
