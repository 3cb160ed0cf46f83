//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::AttachmentVault;

/// How long shutdown waits for running uploads
const UPLOAD_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

impl AttachmentVault {
    /// Gracefully shut down the vault
    ///
    /// 1. Stops accepting new uploads and downloads
    /// 2. Cancels every active download stream
    /// 3. Waits up to 30 seconds for running uploads to finish
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Uploads still running after the timeout are left to finish or fail on
    /// their own; their records are written only if they complete.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.lifecycle.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new transfers");

        self.lifecycle.shutdown_token.cancel();
        tracing::info!("Cancelled active download streams");

        match tokio::time::timeout(UPLOAD_DRAIN_TIMEOUT, self.wait_for_active_uploads()).await {
            Ok(()) => tracing::info!("All active uploads completed"),
            Err(_) => tracing::warn!(
                active = self.active_uploads(),
                "Timeout waiting for uploads to complete, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.lifecycle.is_accepting()
    }

    /// Number of uploads currently running
    pub fn active_uploads(&self) -> usize {
        self.lifecycle.active_uploads.load(Ordering::SeqCst)
    }

    /// Token that fires once shutdown starts
    ///
    /// Cancelling the returned token does not shut the vault down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.lifecycle.shutdown_token.child_token()
    }

    async fn wait_for_active_uploads(&self) {
        loop {
            let active = self.active_uploads();
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for active uploads to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
