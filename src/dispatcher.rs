//! Batch dispatcher
//!
//! Drains the [`DispatchBuffer`] every period (and, when eager, as soon as it
//! fills) and hands each non-empty batch to the [`DownloadSink`] in a spawned
//! task. Sink outcomes are logged and broadcast; failed batches are not
//! re-queued.

use crate::buffer::DispatchBuffer;
use crate::sink::DownloadSink;
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Periodically moves buffered identifiers to the sink
pub struct BatchDispatcher {
    buffer: Arc<DispatchBuffer>,
    sink: Arc<dyn DownloadSink>,
    period: Duration,
    eager: bool,
    event_tx: broadcast::Sender<Event>,
    tracker: TaskTracker,
}

impl BatchDispatcher {
    /// Create a dispatcher draining `buffer` every `period`
    pub fn new(
        buffer: Arc<DispatchBuffer>,
        sink: Arc<dyn DownloadSink>,
        period: Duration,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            buffer,
            sink,
            period,
            eager: true,
            event_tx,
            tracker: TaskTracker::new(),
        }
    }

    /// Dispatch as soon as the buffer fills instead of waiting for the period
    pub fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Task group holding in-flight sink calls
    ///
    /// The tracker is closed when [`run`](Self::run) returns, so
    /// `tracker.wait()` completes once the last sink call finishes.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Run until `cancel` fires, then flush once more and return
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(
            period_ms = self.period.as_millis() as u64,
            eager = self.eager,
            sink = self.sink.name(),
            "Batch dispatcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.buffer.filled(), if self.eager => {
                    tracing::debug!(capacity = self.buffer.capacity(), "Dispatch buffer full, dispatching early");
                }
            }
            self.dispatch();
        }

        let flushed = self.dispatch();
        if flushed > 0 {
            tracing::info!(batch_size = flushed, "Flushed remaining submissions on shutdown");
        }
        self.tracker.close();
        tracing::debug!("Batch dispatcher stopped");
    }

    /// Drain the buffer and hand the batch to the sink without waiting
    ///
    /// Returns the number of identifiers dispatched.
    pub fn dispatch(&self) -> usize {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        let sink = self.sink.clone();
        let event_tx = self.event_tx.clone();

        self.tracker.spawn(async move {
            match sink.deliver(&batch).await {
                Ok(()) => {
                    tracing::info!(batch_size = size, sink = sink.name(), "Batch dispatched");
                    event_tx.send(Event::BatchDispatched { size }).ok();
                }
                Err(e) => {
                    tracing::error!(
                        batch_size = size,
                        sink = sink.name(),
                        error = %e,
                        "Batch dispatch failed"
                    );
                    event_tx
                        .send(Event::BatchFailed {
                            size,
                            error: e.to_string(),
                        })
                        .ok();
                }
            }
        });

        size
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubmissionId;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<SubmissionId>>>,
        fail: bool,
    }

    #[async_trait]
    impl DownloadSink for RecordingSink {
        async fn deliver(&self, batch: &[SubmissionId]) -> crate::Result<()> {
            self.batches.lock().unwrap().push(batch.to_vec());
            if self.fail {
                Err(crate::Error::Sink("download server unavailable".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn setup(
        capacity: usize,
        sink: RecordingSink,
        period: Duration,
    ) -> (
        Arc<DispatchBuffer>,
        Arc<RecordingSink>,
        BatchDispatcher,
        broadcast::Receiver<Event>,
    ) {
        let buffer = Arc::new(DispatchBuffer::new(capacity).unwrap());
        let sink = Arc::new(sink);
        let (event_tx, events) = broadcast::channel(16);
        let dispatcher = BatchDispatcher::new(buffer.clone(), sink.clone(), period, event_tx);
        (buffer, sink, dispatcher, events)
    }

    async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .unwrap()
    }

    #[tokio::test]
    async fn empty_buffer_dispatches_nothing() {
        let (_buffer, sink, dispatcher, _events) =
            setup(4, RecordingSink::default(), Duration::from_secs(60));
        assert_eq!(dispatcher.dispatch(), 0);
        dispatcher.tracker().close();
        dispatcher.tracker().wait().await;
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn periodic_dispatch_sends_one_batch() {
        let (buffer, sink, dispatcher, mut events) =
            setup(10, RecordingSink::default(), Duration::from_millis(50));
        for id in ["x1", "y1", "z1"] {
            buffer.offer(id.into()).unwrap();
        }

        let cancel = CancellationToken::new();
        let tracker = dispatcher.tracker();
        let handle = tokio::spawn(dispatcher.run(cancel.clone()));

        assert_eq!(next_event(&mut events).await, Event::BatchDispatched { size: 3 });
        cancel.cancel();
        handle.await.unwrap();
        tracker.wait().await;

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], ["x1", "y1", "z1"].map(SubmissionId::from).to_vec());
    }

    #[tokio::test]
    async fn eager_dispatch_fires_when_buffer_fills() {
        let (buffer, sink, dispatcher, mut events) =
            setup(2, RecordingSink::default(), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(cancel.clone()));

        buffer.offer("a".into()).unwrap();
        buffer.offer("b".into()).unwrap();

        assert_eq!(next_event(&mut events).await, Event::BatchDispatched { size: 2 });
        assert!(buffer.is_empty());
        assert_eq!(sink.batches.lock().unwrap().len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lazy_dispatch_waits_for_cancel_flush() {
        let (buffer, sink, dispatcher, _events) =
            setup(2, RecordingSink::default(), Duration::from_secs(3600));
        let dispatcher = dispatcher.with_eager(false);
        let tracker = dispatcher.tracker();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(cancel.clone()));

        buffer.offer("a".into()).unwrap();
        buffer.offer("b".into()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(buffer.len(), 2, "full buffer should wait for the period");

        cancel.cancel();
        handle.await.unwrap();
        tracker.wait().await;
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_is_not_requeued() {
        let (buffer, sink, dispatcher, mut events) = setup(
            4,
            RecordingSink {
                fail: true,
                ..Default::default()
            },
            Duration::from_secs(3600),
        );
        buffer.offer("a".into()).unwrap();
        assert_eq!(dispatcher.dispatch(), 1);

        match next_event(&mut events).await {
            Event::BatchFailed { size, error } => {
                assert_eq!(size, 1);
                assert!(error.contains("unavailable"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(buffer.is_empty());
        assert_eq!(dispatcher.dispatch(), 0);
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }
}
