//! Batched refresh of expiring attachment URLs
//!
//! The host renews at most 40 URLs per request. A file's links are split
//! into consecutive batches, each batch is one host call, and the answers
//! are concatenated in submission order. One failed batch fails the whole
//! refresh; partial results are discarded.

use crate::config::{MAX_REFRESH_BATCH, RefreshPolicy, RetryConfig};
use crate::error::{Result, TransferError};
use crate::host::AttachmentHost;
use crate::retry::with_retry;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Renews chunk URLs through the attachment host
pub(crate) struct LinkRefresher {
    host: Arc<dyn AttachmentHost>,
    batch_size: usize,
    retry: RetryConfig,
}

impl LinkRefresher {
    /// Batch size is capped by the host's own limit and by [`MAX_REFRESH_BATCH`]
    pub(crate) fn new(host: Arc<dyn AttachmentHost>, batch_size: usize, retry: RetryConfig) -> Self {
        let batch_size = batch_size
            .min(MAX_REFRESH_BATCH)
            .min(host.max_refresh_batch())
            .max(1);
        Self {
            host,
            batch_size,
            retry,
        }
    }

    /// Refresh `urls`, returning new URLs index-aligned with the input
    pub(crate) async fn refresh(&self, urls: &[String]) -> Result<Vec<String>> {
        let normalized: Vec<String> = urls.iter().map(|u| normalize_link(u)).collect();
        let mut refreshed = Vec::with_capacity(normalized.len());

        for (batch, slice) in normalized.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch, urls = slice.len(), host = self.host.name(), "refreshing batch");

            let answer = with_retry(&self.retry, "refresh_urls", || self.host.refresh_urls(slice))
                .await
                .map_err(|e| TransferError::RefreshFailed {
                    batch,
                    reason: e.to_string(),
                })?;

            if answer.len() != slice.len() {
                return Err(TransferError::RefreshFailed {
                    batch,
                    reason: format!(
                        "host returned {} URLs for a batch of {}",
                        answer.len(),
                        slice.len()
                    ),
                }
                .into());
            }

            refreshed.extend(answer);
        }

        Ok(refreshed)
    }
}

/// Clean a stored link before sending it to the refresh endpoint
///
/// Surrounding whitespace is trimmed and single quotes become double quotes,
/// matching how links were submitted when the registry was first written.
pub(crate) fn normalize_link(url: &str) -> String {
    url.trim().replace('\'', "\"")
}

/// Expiry carried in a CDN link's `ex=` parameter (hex unix seconds)
pub(crate) fn link_expiry(url: &str) -> Option<DateTime<Utc>> {
    let parsed = url::Url::parse(url).ok()?;
    let (_, hex) = parsed.query_pairs().find(|(k, _)| k == "ex")?;
    let secs = i64::from_str_radix(&hex, 16).ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Whether `links` must be refreshed before they are fetched at `now`
///
/// Under [`RefreshPolicy::WhenExpiring`] a link without a readable expiry
/// always counts as expiring.
pub(crate) fn needs_refresh(links: &[String], policy: &RefreshPolicy, now: DateTime<Utc>) -> bool {
    match policy {
        RefreshPolicy::Always => true,
        RefreshPolicy::WhenExpiring { margin } => {
            let deadline = chrono::Duration::from_std(*margin)
                .ok()
                .and_then(|margin| now.checked_add_signed(margin));
            let Some(deadline) = deadline else {
                return true;
            };
            links
                .iter()
                .any(|link| link_expiry(link).is_none_or(|expiry| expiry <= deadline))
        }
    }
}
