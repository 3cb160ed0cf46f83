//! Link refresh and streamed download.

use crate::error::{Error, RegistryError, Result};
use crate::refresh::needs_refresh;
use crate::stream::{DownloadStream, StreamPlan};
use crate::types::{Event, FileRecord};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::AttachmentVault;

impl AttachmentVault {
    /// Refresh a file's chunk links and persist them
    ///
    /// All links are renewed in batches; if any batch fails nothing is
    /// written and the stored links stay as they were. If the file is
    /// re-uploaded or refreshed while the host call is in flight, the
    /// result is discarded with [`RegistryError::LinksChanged`].
    pub async fn refresh_links(&self, name: &str) -> Result<FileRecord> {
        let record = self.registry.get(name).await?;
        self.refresh_record(&record).await
    }

    async fn refresh_record(&self, record: &FileRecord) -> Result<FileRecord> {
        let links = self.refresher.refresh(&record.chunk_links).await?;
        let updated = self
            .registry
            .update_chunk_links(&record.name, &record.chunk_links, links)
            .await?;

        tracing::info!(name = %record.name, links = updated.total_chunks, "links refreshed");
        self.emit_event(Event::LinksRefreshed {
            name: record.name.clone(),
            count: updated.total_chunks,
        });

        Ok(updated)
    }

    /// Stream a stored file back
    ///
    /// The record is looked up before any network call. Links are refreshed
    /// (per `transfer.refresh_policy`) and persisted before the stream is
    /// returned. The stream itself is lazy: chunks are fetched as it is polled.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no file has this name
    /// - [`Error::ShuttingDown`] once shutdown has started
    /// - [`Error::Transfer`] if the link refresh fails
    pub async fn download(&self, name: &str) -> Result<DownloadStream> {
        if !self.lifecycle.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let mut record = self.registry.get(name).await?;

        if needs_refresh(
            &record.chunk_links,
            &self.config.transfer.refresh_policy,
            chrono::Utc::now(),
        ) {
            record = match self.refresh_record(&record).await {
                Ok(updated) => updated,
                // whoever replaced the links wrote fresh ones
                Err(Error::Registry(RegistryError::LinksChanged { .. })) => {
                    tracing::debug!(name = %name, "links replaced during refresh, using stored record");
                    self.registry.get(name).await?
                }
                Err(e) => return Err(e),
            };
        } else {
            tracing::debug!(name = %name, "links still valid, skipping refresh");
        }

        let plan = StreamPlan {
            buffer_size: self.config.transfer.download_buffer_size,
            prefetch: self.config.transfer.download_prefetch,
            idle_timeout: self.config.host.fetch_idle_timeout,
            retry: self.config.retry.clone(),
        };

        tracing::info!(name = %name, chunks = record.total_chunks, "download started");
        self.emit_event(Event::DownloadStarted {
            name: name.to_string(),
            total_chunks: record.total_chunks,
        });

        Ok(DownloadStream::new(
            record.name,
            record.chunk_links,
            record.size_bytes,
            self.host.clone(),
            plan,
            self.lifecycle.shutdown_token.child_token(),
        ))
    }

    /// Download a file to `path`
    ///
    /// Bytes go to a temporary file beside `path`, which is renamed into
    /// place only after the whole file arrived. Returns the bytes written.
    pub async fn download_to_path(&self, name: &str, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let mut stream = self.download(name).await?;
        let tmp = partial_path(path);

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            let mut written = 0u64;
            while let Some(piece) = stream.next().await {
                let piece = piece?;
                file.write_all(&piece).await?;
                written += piece.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, Error>(written)
        }
        .await;

        match result {
            Ok(written) => {
                tokio::fs::rename(&tmp, path).await?;
                tracing::info!(name = %name, path = %path.display(), bytes = written, "file saved");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }
}

/// `<path>.partial` in the same directory
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
