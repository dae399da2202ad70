//! Trait implemented by every download sink

use crate::types::SubmissionId;
use async_trait::async_trait;

/// Receiver of drained batches
///
/// The dispatcher spawns each call, so an implementation may take as long as
/// it needs; a slow sink never delays the next drain. Two calls can run at the
/// same time and finish in any order.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use rippl::sink::DownloadSink;
/// use rippl::types::SubmissionId;
///
/// struct Stdout;
///
/// #[async_trait]
/// impl DownloadSink for Stdout {
///     async fn deliver(&self, batch: &[SubmissionId]) -> rippl::Result<()> {
///         for id in batch {
///             println!("{id}");
///         }
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "stdout"
///     }
/// }
/// ```
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Hand one batch downstream
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered. The dispatcher
    /// only logs it; the identifiers are not re-queued.
    async fn deliver(&self, batch: &[SubmissionId]) -> crate::Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
