//! Subscription plumbing shared by every post source

use crate::error::StreamError;
use crate::types::Post;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Options applied when a subscription is opened
#[derive(Clone, Copy, Debug)]
pub struct SubscribeOptions {
    /// Time between polls of the feed
    pub interval: Duration,
    /// Skip everything already in the feed when the subscription starts
    pub discard_initial: bool,
}

impl SubscribeOptions {
    /// Poll every `interval`, discarding the existing backlog
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            discard_initial: true,
        }
    }
}

/// One item read from a subscription
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// A new post
    Post(Post),
    /// A transport failure; the producer keeps going unless it is terminal
    Error(StreamError),
}

/// Receiving half of a feed subscription
///
/// Dropping the subscription (or calling [`Subscription::stop`]) signals the
/// producer to stop and close both channels.
#[derive(Debug)]
pub struct Subscription {
    posts: mpsc::Receiver<Post>,
    errors: mpsc::Receiver<StreamError>,
    stop: CancellationToken,
}

/// Producing half of a feed subscription
#[derive(Debug, Clone)]
pub struct SubscriptionSender {
    posts: mpsc::Sender<Post>,
    errors: mpsc::Sender<StreamError>,
    stop: CancellationToken,
}

impl Subscription {
    /// Create a connected sender/subscription pair with bounded channels
    pub fn channel(buffer: usize) -> (SubscriptionSender, Subscription) {
        let (posts_tx, posts_rx) = mpsc::channel(buffer);
        let (errors_tx, errors_rx) = mpsc::channel(buffer);
        let stop = CancellationToken::new();

        (
            SubscriptionSender {
                posts: posts_tx,
                errors: errors_tx,
                stop: stop.clone(),
            },
            Subscription {
                posts: posts_rx,
                errors: errors_rx,
                stop,
            },
        )
    }

    /// Wait for the next post or error
    ///
    /// Returns `None` once either channel has closed, which means the
    /// subscription is over.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        tokio::select! {
            post = self.posts.recv() => match post {
                Some(post) => Some(SubscriptionEvent::Post(post)),
                None => self.errors.recv().await.map(SubscriptionEvent::Error),
            },
            error = self.errors.recv() => match error {
                Some(error) => Some(SubscriptionEvent::Error(error)),
                // Both halves close together; hand out posts still in flight.
                None => self.posts.recv().await.map(SubscriptionEvent::Post),
            },
        }
    }

    /// Ask the producer to stop
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl SubscriptionSender {
    /// Deliver a post; returns false once the subscription is gone
    pub async fn send_post(&self, post: Post) -> bool {
        tokio::select! {
            _ = self.stop.cancelled() => false,
            sent = self.posts.send(post) => sent.is_ok(),
        }
    }

    /// Deliver a transport error; returns false once the subscription is gone
    pub async fn send_error(&self, error: StreamError) -> bool {
        tokio::select! {
            _ = self.stop.cancelled() => false,
            sent = self.errors.send(error) => sent.is_ok(),
        }
    }

    /// Resolves when the subscriber stops or drops the subscription
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// Whether the subscriber has stopped the subscription
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// A feed provider that can be subscribed to by name
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Open a subscription to `source`
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be started, for example
    /// when credentials are rejected. Failures after startup are delivered on
    /// the subscription's error channel instead.
    async fn subscribe(
        &self,
        source: &str,
        options: SubscribeOptions,
    ) -> crate::Result<Subscription>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_yields_posts_and_errors() {
        let (tx, mut sub) = Subscription::channel(4);
        assert!(tx.send_post(Post::new("a", "title")).await);
        assert!(matches!(sub.next().await, Some(SubscriptionEvent::Post(p)) if p.id == "a"));

        assert!(tx.send_error(StreamError::Decode("bad".into())).await);
        assert!(matches!(sub.next().await, Some(SubscriptionEvent::Error(_))));
    }

    #[tokio::test]
    async fn dropping_subscription_stops_sender() {
        let (tx, sub) = Subscription::channel(1);
        assert!(!tx.is_stopped());
        drop(sub);
        assert!(tx.is_stopped());
        assert!(!tx.send_post(Post::new("a", "t")).await);
    }

    #[tokio::test]
    async fn closed_sender_ends_subscription() {
        let (tx, mut sub) = Subscription::channel(1);
        drop(tx);
        assert!(sub.next().await.is_none());
    }
}
