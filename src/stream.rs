//! Ordered re-streaming of a file's chunks
//!
//! Chunks are opened in order with up to `prefetch` connections opened
//! ahead of the chunk being read. Bodies are consumed strictly in chunk
//! order and re-cut into pieces of at most `buffer_size` bytes.

use crate::config::RetryConfig;
use crate::error::{Error, Result, TransferError};
use crate::host::{AttachmentHost, BlobStream};
use crate::retry::with_retry;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Knobs for one download
#[derive(Clone, Debug)]
pub(crate) struct StreamPlan {
    pub(crate) buffer_size: usize,
    pub(crate) prefetch: usize,
    pub(crate) idle_timeout: Duration,
    pub(crate) retry: RetryConfig,
}

/// The reassembled bytes of one stored file
///
/// Single pass and not restartable. Dropping it closes every open chunk
/// connection. Cancelling its token (see [`cancellation_token`]) ends the
/// stream with [`Error::Cancelled`] at the next poll.
///
/// [`cancellation_token`]: DownloadStream::cancellation_token
pub struct DownloadStream {
    name: String,
    total_chunks: usize,
    size_bytes: Option<u64>,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    inner: BoxStream<'static, Result<Bytes>>,
    finished: bool,
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("name", &self.name)
            .field("total_chunks", &self.total_chunks)
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

impl DownloadStream {
    pub(crate) fn new(
        name: String,
        links: Vec<String>,
        size_bytes: Option<u64>,
        host: Arc<dyn AttachmentHost>,
        plan: StreamPlan,
        cancel: CancellationToken,
    ) -> Self {
        let total_chunks = links.len();
        Self {
            name,
            total_chunks,
            size_bytes,
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
            cancel,
            inner: chunk_stream(host, links, plan),
            finished: false,
        }
    }

    /// Name of the file being streamed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of chunks the stream will fetch
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Total size, when the record knows it
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    /// Token that cancels this stream
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the stream; the next poll yields [`Error::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for DownloadStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finished = true;
            tracing::info!(name = %this.name, "download cancelled");
            return Poll::Ready(Some(Err(Error::Cancelled(this.name.clone()))));
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                tracing::error!(name = %this.name, error = %e, "download failed");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                tracing::debug!(name = %this.name, "download stream finished");
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = std::result::Result<T, tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn fetch_failed(index: usize, url: &str, reason: impl Into<String>) -> Error {
    TransferError::ChunkFetchFailed {
        index,
        url: url.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn chunk_stream(
    host: Arc<dyn AttachmentHost>,
    links: Vec<String>,
    plan: StreamPlan,
) -> BoxStream<'static, Result<Bytes>> {
    let buffer_size = plan.buffer_size.max(1);
    let idle_timeout = plan.idle_timeout;
    let retry = plan.retry;

    stream::iter(links.into_iter().enumerate())
        .map(move |(i, url)| {
            let index = i + 1;
            let host = host.clone();
            let retry = retry.clone();
            // Spawned so the open makes progress while earlier chunks stream
            let open = AbortOnDrop(tokio::spawn(async move {
                let body = with_retry(&retry, "fetch_blob", || host.fetch_blob(&url))
                    .await
                    .map_err(|e| fetch_failed(index, &url, e.to_string()))?;
                tracing::debug!(chunk = index, "chunk opened");
                Ok::<_, Error>((index, url, body))
            }));
            async move {
                open.await
                    .map_err(|e| Error::Other(format!("chunk {index} open task failed: {e}")))?
            }
        })
        .buffered(plan.prefetch.max(1) + 1)
        .map_ok(move |(index, url, body)| chunk_body(index, url, body, buffer_size, idle_timeout))
        .try_flatten()
        .boxed()
}

/// One chunk's body, sliced to `buffer_size` and guarded by the idle timeout
fn chunk_body(
    index: usize,
    url: String,
    body: BlobStream,
    buffer_size: usize,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes>> + Send {
    stream::try_unfold(
        (body, Bytes::new(), url),
        move |(mut body, mut pending, url)| async move {
            while pending.is_empty() {
                match tokio::time::timeout(idle_timeout, body.next()).await {
                    Err(_) => {
                        return Err(fetch_failed(
                            index,
                            &url,
                            format!("no data for {}s", idle_timeout.as_secs()),
                        ));
                    }
                    Ok(Some(Ok(piece))) => pending = piece,
                    Ok(Some(Err(e))) => return Err(fetch_failed(index, &url, e.to_string())),
                    Ok(None) => return Ok(None),
                }
            }

            let piece = pending.split_to(pending.len().min(buffer_size));
            Ok(Some((piece, (body, pending, url))))
        },
    )
}
