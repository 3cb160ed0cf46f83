//! # attachvault
//!
//! Store files of any size on a chat service's attachment hosting.
//!
//! Files are cut into chunks that fit the host's per-attachment limit, each
//! chunk is posted as its own message attachment, and the ordered chunk URLs
//! are kept in a JSON registry. Downloads renew the signed URLs in batches
//! and stream the chunks back in order without buffering the whole file.
//!
//! ## Design Philosophy
//!
//! - **Streaming both ways** - Uploads read one chunk at a time, downloads
//!   yield small pieces as they arrive
//! - **Durable registry** - Every mutation is written atomically; a failed
//!   upload never leaves a record behind
//! - **Host behind a trait** - The Discord adapter and an in-memory host
//!   share the [`AttachmentHost`] seam
//! - **Event-driven** - Consumers subscribe to progress events
//!
//! ## Quick Start
//!
//! ```no_run
//! use attachvault::{AttachmentVault, Config};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // BOT_TOKEN, USER_TOKEN and UPLOAD_CHANNEL_ID from the environment
//!     let config = Config::from_env()?;
//!     let vault = AttachmentVault::new(config).await?;
//!
//!     let mut events = vault.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     vault.upload_file("backup.tar", None).await?;
//!
//!     let mut stream = vault.download("backup.tar").await?;
//!     while let Some(piece) = stream.next().await {
//!         let bytes = piece?;
//!         println!("received {} bytes", bytes.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Stream chunking and parallel chunk upload
pub(crate) mod chunker;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Attachment host adapters
pub mod host;
/// Batched link refresh
pub(crate) mod refresh;
/// Durable file registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Ordered streaming download
pub mod stream;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// The vault facade (decomposed into focused submodules)
pub mod vault;

// Re-export commonly used types
pub use config::{Config, RefreshPolicy};
pub use error::{
    ApiError, Error, ErrorDetail, RegistryError, Result, ToHttpStatus, TransferError,
};
pub use host::{AttachmentHost, DiscordHost, MemoryHost};
pub use registry::Registry;
pub use stream::DownloadStream;
pub use types::{Event, FileInfo, FileRecord};
pub use vault::AttachmentVault;

/// Run until a termination signal arrives, then shut the vault down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use attachvault::{AttachmentVault, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let vault = AttachmentVault::new(Config::from_env()?).await?;
///
///     run_with_shutdown(vault).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(vault: AttachmentVault) -> Result<()> {
    wait_for_signal().await;
    vault.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
