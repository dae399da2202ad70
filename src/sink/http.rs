//! Sink that POSTs submissions to a download server

use super::traits::DownloadSink;
use crate::config::HttpSinkMode;
use crate::types::SubmissionId;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct DownloadRequest<'a> {
    submission_id: &'a str,
}

/// POSTs each batch to a download server
///
/// In [`HttpSinkMode::PerItem`] mode every identifier becomes its own request
/// with body `{"submission_id": "<id>"}`; the requests of one batch run
/// concurrently. In [`HttpSinkMode::Batch`] mode the whole batch is sent as a
/// single JSON array.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    mode: HttpSinkMode,
    timeout: Duration,
}

impl HttpSink {
    /// Create a sink targeting `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: String, mode: HttpSinkMode, timeout: Duration) -> crate::Result<Self> {
        // The download server is usually a sidecar; avoid holding idle connections to it.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .user_agent(concat!("rippl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            mode,
            timeout,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> crate::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(crate::Error::Sink(format!(
                "download server returned status {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )))
        }
    }
}

#[async_trait]
impl DownloadSink for HttpSink {
    async fn deliver(&self, batch: &[SubmissionId]) -> crate::Result<()> {
        match self.mode {
            HttpSinkMode::Batch => self.post(batch).await,
            HttpSinkMode::PerItem => {
                let requests = batch.iter().map(|id| async move {
                    let result = self
                        .post(&DownloadRequest {
                            submission_id: id.as_str(),
                        })
                        .await;
                    if let Err(e) = &result {
                        tracing::warn!(submission_id = %id, error = %e, "Download request failed");
                    }
                    result
                });

                let results = futures::future::join_all(requests).await;
                let failed = results.iter().filter(|r| r.is_err()).count();
                if failed == 0 {
                    Ok(())
                } else {
                    Err(crate::Error::Sink(format!(
                        "{} of {} download requests failed",
                        failed,
                        batch.len()
                    )))
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.mode {
            HttpSinkMode::PerItem => "http-per-item",
            HttpSinkMode::Batch => "http-batch",
        }
    }
}
