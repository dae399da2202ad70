//! Scripted post source and recording sink

use async_trait::async_trait;
use rippl::source::{PostSource, SubscribeOptions, Subscription};
use rippl::{DownloadSink, Error, Post, StreamError, SubmissionId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// One step of a scripted subscription
pub enum Step {
    /// Deliver a post
    Post(Post),
    /// Deliver a transport error
    Error(StreamError),
    /// Pause before the next step
    Wait(Duration),
    /// Close the subscription
    Close,
    /// Deliver `{prefix}0`, `{prefix}1`, ... until the subscription is stopped
    Flood(&'static str),
}

/// Post with `id` and `title`
pub fn post(id: &str, title: &str) -> Step {
    Step::Post(Post::new(id, title))
}

/// HTTP status error for `source`
pub fn status(source: &str, code: u16) -> Step {
    Step::Error(StreamError::Status {
        source_name: source.to_string(),
        status: code,
    })
}

/// Plays a fixed script per source, then stays open until stopped
///
/// Sources without a script stay silent. Sources listed in `unreachable`
/// fail to subscribe at all.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    unreachable: Vec<String>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, source: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source.to_string(), steps);
        self
    }

    pub fn unreachable(mut self, source: &str) -> Self {
        self.unreachable.push(source.to_string());
        self
    }
}

#[async_trait]
impl PostSource for ScriptedSource {
    async fn subscribe(
        &self,
        source: &str,
        _options: SubscribeOptions,
    ) -> rippl::Result<Subscription> {
        if self.unreachable.iter().any(|s| s == source) {
            return Err(Error::Stream(StreamError::Auth(format!(
                "{source} rejected credentials"
            ))));
        }

        let steps = self.scripts.lock().unwrap().remove(source).unwrap_or_default();
        let (tx, subscription) = Subscription::channel(16);

        tokio::spawn(async move {
            for step in steps {
                let delivered = match step {
                    Step::Post(post) => tx.send_post(post).await,
                    Step::Error(error) => tx.send_error(error).await,
                    Step::Wait(delay) => {
                        tokio::select! {
                            _ = tx.stopped() => false,
                            _ = tokio::time::sleep(delay) => true,
                        }
                    }
                    Step::Close => return,
                    Step::Flood(prefix) => {
                        let mut n = 0u64;
                        while tx.send_post(Post::new(format!("{prefix}{n}"), "flood")).await {
                            n += 1;
                            tokio::time::sleep(Duration::from_millis(1)).await;
                        }
                        false
                    }
                };
                if !delivered {
                    return;
                }
            }
            tx.stopped().await;
        });

        Ok(subscription)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Records every batch it receives
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<SubmissionId>>>,
    delivered: Notify,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records batches and then reports failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<SubmissionId>> {
        self.batches.lock().unwrap().clone()
    }

    /// Every identifier received, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .batches()
            .into_iter()
            .flatten()
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Wait until at least `count` batches have arrived
    pub async fn wait_for_batches(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.delivered.notified();
                if self.batches.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl DownloadSink for RecordingSink {
    async fn deliver(&self, batch: &[SubmissionId]) -> rippl::Result<()> {
        self.batches.lock().unwrap().push(batch.to_vec());
        self.delivered.notify_waiters();
        if self.fail {
            Err(Error::Sink("download server unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
