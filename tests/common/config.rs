//! Test configuration helpers for loading .env credentials and creating test vaults

use attachvault::config::RetryConfig;
use attachvault::{AttachmentVault, Config};
use bytes::Bytes;
use futures::TryStreamExt;
use std::time::Duration;
use tempfile::TempDir;

/// Config with the registry in `dir` and near-instant retries
pub fn test_config(dir: &TempDir) -> Config {
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

/// Whether `.env` or the environment carries credentials for the real host
///
/// Required: `BOT_TOKEN`, `USER_TOKEN`, `UPLOAD_CHANNEL_ID`.
pub fn has_live_credentials() -> bool {
    dotenvy::dotenv().ok();
    ["BOT_TOKEN", "USER_TOKEN", "UPLOAD_CHANNEL_ID"]
        .iter()
        .all(|key| std::env::var(key).is_ok_and(|v| !v.is_empty()))
}

/// Create a vault against the real host using environment credentials
///
/// Returns the vault and temp directory (keep temp_dir alive for test duration)
pub async fn create_live_vault() -> attachvault::Result<(AttachmentVault, TempDir)> {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir()?;

    let mut config = Config::from_env()?;
    config.persistence.registry_path = dir.path().join("uploads.json");
    // keep live uploads small and quick
    config.transfer.max_chunk_size = 256 * 1024;

    let vault = AttachmentVault::new(config).await?;
    Ok((vault, dir))
}

/// Deterministic test payload
pub fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>().into()
}

/// Drain a download stream into one buffer
pub async fn read_all(stream: attachvault::DownloadStream) -> attachvault::Result<Vec<u8>> {
    let pieces: Vec<Bytes> = stream.try_collect().await?;
    Ok(pieces.concat())
}

/// Install a tracing subscriber honoring RUST_LOG; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
