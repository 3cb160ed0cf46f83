//! The attachment host interface

use crate::config::MAX_REFRESH_BATCH;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Body of a fetched blob, yielded as the host delivers it
pub type BlobStream = BoxStream<'static, crate::Result<Bytes>>;

/// An external service that stores binary blobs behind time-limited URLs
///
/// Implementations must be cheap to share: the vault holds one behind an
/// `Arc` and calls it from many tasks at once.
///
/// # Examples
///
/// ```
/// use attachvault::host::{AttachmentHost, MemoryHost};
/// use bytes::Bytes;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let host = MemoryHost::new();
/// let url = host.upload_blob(Bytes::from_static(b"hello"), "greeting.part1").await?;
/// let refreshed = host.refresh_urls(&[url.clone()]).await?;
/// assert_eq!(refreshed.len(), 1);
/// assert_ne!(refreshed[0], url);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait AttachmentHost: Send + Sync {
    /// Store one blob and return the URL it can be fetched from
    ///
    /// `label` becomes the attachment's filename on the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Host`](crate::Error::Host) when the host rejects the
    /// upload, [`Error::Timeout`](crate::Error::Timeout) or
    /// [`Error::Network`](crate::Error::Network) on transport failure.
    async fn upload_blob(&self, data: Bytes, label: &str) -> crate::Result<String>;

    /// Exchange one batch of (possibly expired) URLs for currently valid ones
    ///
    /// The batch never exceeds [`max_refresh_batch`](Self::max_refresh_batch);
    /// the result must be index-aligned with `urls`.
    async fn refresh_urls(&self, urls: &[String]) -> crate::Result<Vec<String>>;

    /// Open a streaming GET of a blob
    ///
    /// A non-success status is reported as
    /// [`Error::Host`](crate::Error::Host) with the status set.
    async fn fetch_blob(&self, url: &str) -> crate::Result<BlobStream>;

    /// Largest batch `refresh_urls` accepts
    fn max_refresh_batch(&self) -> usize {
        MAX_REFRESH_BATCH
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
