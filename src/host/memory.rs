//! In-process attachment host
//!
//! Blobs live in a map keyed by id. Every blob carries a generation; a URL is
//! only fetchable while its generation is the blob's current one, so stale
//! links behave like expired CDN links. Refreshing a URL bumps the generation.

use super::traits::{AttachmentHost, BlobStream};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

struct Blob {
    data: Bytes,
    label: String,
    generation: u64,
}

#[derive(Default)]
struct State {
    blobs: HashMap<u64, Blob>,
    next_id: u64,
    uploaded_labels: Vec<String>,
    refresh_batches: Vec<usize>,
    fail_upload_calls: HashSet<usize>,
    fail_fetch_labels: HashSet<String>,
    stall_fetch_labels: HashSet<String>,
    fail_refresh: bool,
    short_refresh: bool,
}

/// [`AttachmentHost`] kept entirely in memory
///
/// Records what the vault asks of it and can be told to fail specific calls.
pub struct MemoryHost {
    state: Mutex<State>,
    upload_delay: Option<Duration>,
    refresh_delay: Option<Duration>,
    fetch_piece_size: usize,
    link_ttl: Duration,
    max_batch: usize,
    upload_calls: AtomicUsize,
    uploads_in_flight: AtomicUsize,
    peak_uploads: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when an upload finishes or is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            upload_delay: None,
            refresh_delay: None,
            fetch_piece_size: 4096,
            link_ttl: Duration::from_secs(24 * 60 * 60),
            max_batch: crate::config::MAX_REFRESH_BATCH,
            upload_calls: AtomicUsize::new(0),
            uploads_in_flight: AtomicUsize::new(0),
            peak_uploads: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every upload (makes concurrency observable)
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Sleep this long before answering every refresh batch
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Size of the pieces a fetched body is delivered in
    pub fn with_fetch_piece_size(mut self, size: usize) -> Self {
        self.fetch_piece_size = size.max(1);
        self
    }

    /// Lifetime encoded in the `ex=` parameter of issued URLs
    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    /// Advertise a smaller refresh batch limit than the default
    pub fn with_max_refresh_batch(mut self, max: usize) -> Self {
        self.max_batch = max.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the `call`-th upload (1-based, counted across all files)
    pub fn fail_upload_call(&self, call: usize) {
        self.state().fail_upload_calls.insert(call);
    }

    /// Fail every fetch of the blob uploaded under `label`
    pub fn fail_fetch_of(&self, label: &str) {
        self.state().fail_fetch_labels.insert(label.to_string());
    }

    /// Deliver the first piece of `label`'s body, then never another
    pub fn stall_fetch_of(&self, label: &str) {
        self.state().stall_fetch_labels.insert(label.to_string());
    }

    /// Make every refresh call fail with an authorization error
    pub fn fail_refresh(&self, fail: bool) {
        self.state().fail_refresh = fail;
    }

    /// Answer refresh batches with one URL too few
    pub fn short_refresh_responses(&self, short: bool) {
        self.state().short_refresh = short;
    }

    /// Invalidate every issued URL, as if all links had expired
    pub fn expire_all(&self) {
        for blob in self.state().blobs.values_mut() {
            blob.generation += 1;
        }
    }

    /// Number of upload calls received, failed ones included
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Labels of successfully stored blobs, in completion order
    pub fn uploaded_labels(&self) -> Vec<String> {
        self.state().uploaded_labels.clone()
    }

    /// Size of every refresh batch received, in call order
    pub fn refresh_batches(&self) -> Vec<usize> {
        self.state().refresh_batches.clone()
    }

    /// Highest number of uploads observed in flight at once
    pub fn peak_concurrent_uploads(&self) -> usize {
        self.peak_uploads.load(Ordering::SeqCst)
    }

    /// Number of fetch calls received
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of stored blobs, orphans included
    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }

    fn url_for(&self, id: u64, generation: u64) -> String {
        let expires = chrono::Utc::now().timestamp() + self.link_ttl.as_secs() as i64;
        format!("memory://blob/{id}?gen={generation}&ex={expires:x}")
    }
}

/// Extract `(id, generation)` from a URL issued by this host
fn parse_url(raw: &str) -> Option<(u64, u64)> {
    let url = url::Url::parse(raw).ok()?;
    if url.scheme() != "memory" || url.host_str() != Some("blob") {
        return None;
    }
    let id = url.path().trim_start_matches('/').parse().ok()?;
    let generation = url
        .query_pairs()
        .find(|(k, _)| k == "gen")
        .and_then(|(_, v)| v.parse().ok())?;
    Some((id, generation))
}

fn host_error(status: u16, message: impl Into<String>) -> Error {
    Error::Host {
        status: Some(status),
        message: message.into(),
    }
}

#[async_trait]
impl AttachmentHost for MemoryHost {
    async fn upload_blob(&self, data: Bytes, label: &str) -> Result<String> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.uploads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.uploads_in_flight);
        self.peak_uploads.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_upload_calls.contains(&call) {
            return Err(host_error(500, format!("injected failure on upload call {call}")));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.blobs.insert(
            id,
            Blob {
                data,
                label: label.to_string(),
                generation: 0,
            },
        );
        state.uploaded_labels.push(label.to_string());
        drop(state);

        Ok(self.url_for(id, 0))
    }

    async fn refresh_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }

        let mut issued = Vec::with_capacity(urls.len());
        {
            let mut state = self.state();
            state.refresh_batches.push(urls.len());

            if urls.len() > self.max_batch {
                return Err(host_error(
                    400,
                    format!("batch of {} exceeds {}", urls.len(), self.max_batch),
                ));
            }
            if state.fail_refresh {
                return Err(host_error(401, "invalid user token"));
            }

            for url in urls {
                let (id, _) =
                    parse_url(url).ok_or_else(|| host_error(400, format!("unknown url {url}")))?;
                let blob = state
                    .blobs
                    .get_mut(&id)
                    .ok_or_else(|| host_error(404, format!("no blob {id}")))?;
                blob.generation += 1;
                issued.push((id, blob.generation));
            }

            if state.short_refresh {
                issued.pop();
            }
        }

        Ok(issued
            .into_iter()
            .map(|(id, generation)| self.url_for(id, generation))
            .collect())
    }

    async fn fetch_blob(&self, url: &str) -> Result<BlobStream> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let (id, generation) = parse_url(url).ok_or_else(|| host_error(404, "unknown url"))?;
        let (data, stall) = {
            let state = self.state();
            let blob = state
                .blobs
                .get(&id)
                .ok_or_else(|| host_error(404, format!("no blob {id}")))?;
            if blob.generation != generation {
                return Err(host_error(403, "link expired"));
            }
            if state.fail_fetch_labels.contains(&blob.label) {
                return Err(host_error(500, format!("injected fetch failure for {}", blob.label)));
            }
            (blob.data.clone(), state.stall_fetch_labels.contains(&blob.label))
        };

        let piece = self.fetch_piece_size;
        let pieces: Vec<Result<Bytes>> = (0..data.len())
            .step_by(piece)
            .map(|start| Ok(data.slice(start..(start + piece).min(data.len()))))
            .collect();

        if stall {
            let first = pieces.into_iter().take(1);
            return Ok(futures::stream::iter(first)
                .chain(futures::stream::pending())
                .boxed());
        }

        Ok(futures::stream::iter(pieces).boxed())
    }

    fn max_refresh_batch(&self) -> usize {
        self.max_batch
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn fetch_all(host: &MemoryHost, url: &str) -> Result<Vec<u8>> {
        let pieces: Vec<Bytes> = host.fetch_blob(url).await?.try_collect().await?;
        Ok(pieces.concat())
    }

    #[tokio::test]
    async fn uploaded_blob_is_fetchable_in_pieces() {
        let host = MemoryHost::new().with_fetch_piece_size(3);
        let url = host
            .upload_blob(Bytes::from_static(b"abcdefgh"), "f.part1")
            .await
            .unwrap();

        let pieces: Vec<Bytes> = host.fetch_blob(&url).await.unwrap().try_collect().await.unwrap();

        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces.concat(), b"abcdefgh");
        assert_eq!(host.uploaded_labels(), vec!["f.part1"]);
    }

    #[tokio::test]
    async fn refresh_invalidates_previous_url() {
        let host = MemoryHost::new();
        let old = host.upload_blob(Bytes::from_static(b"x"), "f.part1").await.unwrap();

        let new = host.refresh_urls(&[old.clone()]).await.unwrap();

        assert_eq!(new.len(), 1);
        assert!(matches!(
            host.fetch_blob(&old).await,
            Err(Error::Host { status: Some(403), .. })
        ));
        assert_eq!(fetch_all(&host, &new[0]).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn expire_all_makes_links_stale() {
        let host = MemoryHost::new();
        let url = host.upload_blob(Bytes::from_static(b"x"), "f.part1").await.unwrap();

        host.expire_all();

        assert!(host.fetch_blob(&url).await.is_err());
    }

    #[tokio::test]
    async fn issued_urls_carry_hex_expiry() {
        let host = MemoryHost::new().with_link_ttl(Duration::from_secs(60));
        let url = host.upload_blob(Bytes::from_static(b"x"), "f.part1").await.unwrap();

        let parsed = url::Url::parse(&url).unwrap();
        let ex = parsed
            .query_pairs()
            .find(|(k, _)| k == "ex")
            .map(|(_, v)| i64::from_str_radix(&v, 16).unwrap())
            .unwrap();

        let delta = ex - chrono::Utc::now().timestamp();
        assert!((55..=60).contains(&delta), "expiry {delta}s from now");
    }

    #[tokio::test]
    async fn injected_upload_failure_hits_only_that_call() {
        let host = MemoryHost::new();
        host.fail_upload_call(2);

        assert!(host.upload_blob(Bytes::from_static(b"a"), "f.part1").await.is_ok());
        assert!(host.upload_blob(Bytes::from_static(b"b"), "f.part2").await.is_err());
        assert!(host.upload_blob(Bytes::from_static(b"c"), "f.part3").await.is_ok());

        assert_eq!(host.upload_calls(), 3);
        assert_eq!(host.blob_count(), 2);
    }

    #[tokio::test]
    async fn refresh_rejects_oversized_batches_and_records_sizes() {
        let host = MemoryHost::new().with_max_refresh_batch(2);
        let mut urls = Vec::new();
        for i in 1..=3 {
            urls.push(
                host.upload_blob(Bytes::from_static(b"x"), &format!("f.part{i}"))
                    .await
                    .unwrap(),
            );
        }

        assert!(host.refresh_urls(&urls).await.is_err());
        assert!(host.refresh_urls(&urls[..2]).await.is_ok());
        assert_eq!(host.refresh_batches(), vec![3, 2]);
    }

    #[tokio::test]
    async fn short_refresh_drops_last_url() {
        let host = MemoryHost::new();
        let a = host.upload_blob(Bytes::from_static(b"a"), "f.part1").await.unwrap();
        let b = host.upload_blob(Bytes::from_static(b"b"), "f.part2").await.unwrap();
        host.short_refresh_responses(true);

        let refreshed = host.refresh_urls(&[a, b]).await.unwrap();

        assert_eq!(refreshed.len(), 1);
    }

    #[tokio::test]
    async fn peak_concurrency_is_tracked() {
        let host = std::sync::Arc::new(MemoryHost::new().with_upload_delay(Duration::from_millis(50)));

        let uploads = (1..=3).map(|i| {
            let host = host.clone();
            async move {
                host.upload_blob(Bytes::from_static(b"x"), &format!("f.part{i}"))
                    .await
            }
        });
        futures::future::try_join_all(uploads).await.unwrap();

        assert_eq!(host.peak_concurrent_uploads(), 3);
    }
}
