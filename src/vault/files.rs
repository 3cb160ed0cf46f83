//! Listing, lookup and deletion of stored files.

use crate::error::Result;
use crate::types::{Event, FileInfo, FileRecord};

use super::AttachmentVault;

impl AttachmentVault {
    /// Summaries of all stored files, sorted by name
    pub async fn list_files(&self) -> Vec<FileInfo> {
        self.registry
            .list()
            .await
            .iter()
            .map(FileInfo::from)
            .collect()
    }

    /// Names of all stored files, sorted
    pub async fn list_names(&self) -> Vec<String> {
        self.registry.list_names().await
    }

    /// Full record of one file, links included
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) if no file has this name.
    pub async fn get_file(&self, name: &str) -> Result<FileRecord> {
        self.registry.get(name).await
    }

    /// Forget a file
    ///
    /// Only the registry record is removed; the chunks stay on the host,
    /// unreachable once their links expire.
    pub async fn delete(&self, name: &str) -> Result<FileRecord> {
        let removed = self.registry.delete(name).await?;

        tracing::info!(
            name = %name,
            chunks = removed.total_chunks,
            "file deleted"
        );
        self.emit_event(Event::Deleted {
            name: name.to_string(),
        });

        Ok(removed)
    }
}
