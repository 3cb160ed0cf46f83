//! Chunked upload entry points.

use crate::chunker::{ChunkPlan, upload_chunks};
use crate::error::{Error, Result};
use crate::types::{Event, FileRecord};
use crate::utils::{file_name_from_path, validate_name};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::path::Path;

use super::{AttachmentVault, UploadGuard};

/// Read size when streaming a file from disk
const FILE_READ_CAPACITY: usize = 256 * 1024;

impl AttachmentVault {
    /// Upload a byte stream under `name`
    ///
    /// The stream is cut into chunks of at most `transfer.max_chunk_size`
    /// bytes and uploaded with at most `transfer.upload_concurrency` chunks
    /// in flight. The registry is written once, after every chunk is stored.
    /// An existing record with the same name is replaced.
    ///
    /// `total_size`, when given, must equal the number of bytes the stream
    /// yields.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started
    /// - [`Error::InvalidName`] for names unusable as keys
    /// - [`Error::EmptyUpload`] for a zero-byte stream
    /// - [`Error::SizeMismatch`] when `total_size` is wrong
    /// - [`Error::Transfer`] when a chunk upload fails; nothing is recorded
    pub async fn upload<S>(&self, name: &str, data: S, total_size: Option<u64>) -> Result<FileRecord>
    where
        S: Stream<Item = Result<Bytes>> + Send + Unpin,
    {
        if !self.lifecycle.is_accepting() {
            return Err(Error::ShuttingDown);
        }
        validate_name(name)?;

        let _guard = UploadGuard::new(&self.lifecycle.active_uploads);

        tracing::info!(name = %name, total_size = ?total_size, "upload started");
        self.emit_event(Event::UploadStarted {
            name: name.to_string(),
            total_size,
        });

        let plan = ChunkPlan {
            max_chunk_size: self.config.transfer.max_chunk_size,
            concurrency: self.config.transfer.upload_concurrency,
        };
        let event_tx = self.event_tx.clone();
        let progress_name = name.to_string();

        let result = upload_chunks(
            self.host.clone(),
            name,
            data,
            plan,
            total_size,
            move |index, bytes_uploaded| {
                event_tx
                    .send(Event::ChunkUploaded {
                        name: progress_name.clone(),
                        index,
                        bytes_uploaded,
                    })
                    .ok();
            },
        )
        .await;

        let uploaded = match result {
            Ok(uploaded) => uploaded,
            Err(e) => {
                tracing::error!(name = %name, error = %e, "upload failed, nothing recorded");
                self.emit_event(Event::UploadFailed {
                    name: name.to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let record = FileRecord::new(name, uploaded.links, uploaded.size);
        self.registry.put(record.clone()).await?;

        tracing::info!(
            name = %name,
            chunks = record.total_chunks,
            bytes = uploaded.size,
            "upload complete"
        );
        self.emit_event(Event::UploadComplete {
            name: name.to_string(),
            total_chunks: record.total_chunks,
            size_bytes: uploaded.size,
        });

        Ok(record)
    }

    /// Upload an in-memory buffer
    pub async fn upload_bytes(&self, name: &str, data: Bytes) -> Result<FileRecord> {
        let size = data.len() as u64;
        self.upload(name, stream::iter([Ok(data)]), Some(size)).await
    }

    /// Upload a file from disk, streaming it in
    ///
    /// `name` defaults to the file's own name.
    pub async fn upload_file(&self, path: impl AsRef<Path>, name: Option<&str>) -> Result<FileRecord> {
        let path = path.as_ref();
        let name = match name {
            Some(name) => name.to_string(),
            None => file_name_from_path(path),
        };

        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let data = tokio_util::io::ReaderStream::with_capacity(file, FILE_READ_CAPACITY)
            .map(|piece| piece.map_err(Error::from));

        self.upload(&name, data, Some(size)).await
    }
}
