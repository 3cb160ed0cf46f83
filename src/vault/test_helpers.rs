//! Shared test helpers for creating AttachmentVault instances in tests.

use crate::config::{Config, RetryConfig};
use crate::host::MemoryHost;
use crate::stream::DownloadStream;
use crate::vault::AttachmentVault;
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Config with the registry inside `dir` and near-instant retries
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.registry_path = dir.path().join("uploads.json");
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Vault over a fresh MemoryHost with default chunking.
/// Returns the tempdir too, which must be kept alive.
pub(crate) async fn create_test_vault() -> (AttachmentVault, Arc<MemoryHost>, TempDir) {
    create_test_vault_with(MemoryHost::new(), |_| {}).await
}

/// Vault over `host` with `configure` applied to the test config
pub(crate) async fn create_test_vault_with(
    host: MemoryHost,
    configure: impl FnOnce(&mut Config),
) -> (AttachmentVault, Arc<MemoryHost>, TempDir) {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);

    let host = Arc::new(host);
    let vault = AttachmentVault::with_host(config, host.clone()).await.unwrap();
    (vault, host, dir)
}

/// Small chunks so multi-chunk behavior is cheap to exercise
pub(crate) fn small_chunks(max_chunk_size: usize) -> impl FnOnce(&mut Config) {
    move |config| {
        config.transfer.max_chunk_size = max_chunk_size;
        config.transfer.download_buffer_size = 16;
    }
}

/// Deterministic, non-repeating-looking test payload
pub(crate) fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>().into()
}

/// Drain a download stream into one buffer
pub(crate) async fn read_all(stream: DownloadStream) -> crate::Result<Vec<u8>> {
    let pieces: Vec<Bytes> = stream.try_collect().await?;
    Ok(pieces.concat())
}
