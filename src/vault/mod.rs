//! The vault: one entry point over host, registry and event channel.
//!
//! The `AttachmentVault` struct and its methods are organized by domain:
//! - [`files`] - Listing, lookup and deletion of stored files
//! - [`upload`] - Chunked upload entry points
//! - [`download`] - Link refresh and streamed download
//! - [`lifecycle`] - Shutdown coordination

mod download;
mod files;
mod lifecycle;
mod upload;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::Result;
use crate::host::{AttachmentHost, DiscordHost};
use crate::refresh::LinkRefresher;
use crate::registry::Registry;
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Shutdown bookkeeping shared by all clones of a vault
#[derive(Clone)]
pub(crate) struct Lifecycle {
    /// Cleared once shutdown starts
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every download stream's token
    pub(crate) shutdown_token: CancellationToken,
    /// Uploads currently running
    pub(crate) active_uploads: Arc<AtomicUsize>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            active_uploads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}

/// Counts an upload as active until dropped
pub(crate) struct UploadGuard(Arc<AtomicUsize>);

impl UploadGuard {
    pub(crate) fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Chunked file store on top of an attachment host (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct AttachmentVault {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Where chunks live
    pub(crate) host: Arc<dyn AttachmentHost>,
    /// Durable name → links mapping
    pub(crate) registry: Arc<Registry>,
    /// Batched link renewal
    pub(crate) refresher: Arc<LinkRefresher>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Shutdown state
    pub(crate) lifecycle: Lifecycle,
}

impl AttachmentVault {
    /// Create a vault backed by the Discord REST API
    ///
    /// Validates the configuration, opens the registry document and builds
    /// the HTTP client.
    pub async fn new(config: Config) -> Result<Self> {
        let host = DiscordHost::new(&config.host)?;
        Self::with_host(config, Arc::new(host)).await
    }

    /// Create a vault over any [`AttachmentHost`]
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use attachvault::{AttachmentVault, Config};
    /// use attachvault::host::MemoryHost;
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> attachvault::Result<()> {
    /// let vault = AttachmentVault::with_host(Config::default(), Arc::new(MemoryHost::new())).await?;
    /// let record = vault.upload_bytes("hello.txt", "hello world".into()).await?;
    /// assert_eq!(record.total_chunks, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_host(config: Config, host: Arc<dyn AttachmentHost>) -> Result<Self> {
        config.validate()?;

        let registry = Registry::open(
            &config.persistence.registry_path,
            config.persistence.quarantine_corrupt,
        )
        .await?;

        let refresher = LinkRefresher::new(
            host.clone(),
            config.transfer.refresh_batch_size,
            config.retry.clone(),
        );

        // Buffer of 1000 events; slower subscribers see RecvError::Lagged
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            host = host.name(),
            registry = %config.persistence.registry_path.display(),
            max_chunk_size = config.transfer.max_chunk_size,
            upload_concurrency = config.transfer.upload_concurrency,
            "vault ready"
        );

        Ok(Self {
            config: Arc::new(config),
            host,
            registry: Arc::new(registry),
            refresher: Arc::new(refresher),
            event_tx,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Subscribe to vault events
    ///
    /// Each subscriber receives every event independently.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this vault was built with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Name of the attachment host in use
    pub fn host_name(&self) -> &'static str {
        self.host.name()
    }

    /// Emit an event; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
