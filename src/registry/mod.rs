//! Link registry: the durable `name → FileRecord` mapping
//!
//! The whole registry is one JSON document. Every mutation runs under a
//! single async mutex and re-reads the document from disk, applies the
//! change, writes a sibling temp file, fsyncs it and renames it over the
//! original. Reads are answered from the last persisted snapshot.

mod document;


use crate::error::{Error, RegistryError, Result};
use crate::types::FileRecord;
use document::Document;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Durable store of uploaded files and their chunk links
pub struct Registry {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: tokio::sync::Mutex<()>,
    /// Last document written or loaded
    snapshot: tokio::sync::RwLock<Arc<Document>>,
}

impl Registry {
    /// Open the registry stored at `path`
    ///
    /// A missing or empty file is an empty registry. An unparsable file is
    /// an error, unless `quarantine_corrupt` is set: then it is renamed to
    /// `<file>.corrupt-<unix-timestamp>` and the registry starts empty.
    pub async fn open(path: impl Into<PathBuf>, quarantine_corrupt: bool) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let document = match load(&path).await {
            Ok(document) => document,
            Err(Error::Registry(RegistryError::Corrupt { reason, .. })) if quarantine_corrupt => {
                let aside = quarantine(&path).await?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    reason = %reason,
                    "registry document is corrupt, starting empty"
                );
                Document::default()
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            path = %path.display(),
            files = document.files.len(),
            "registry opened"
        );

        Ok(Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
            snapshot: tokio::sync::RwLock::new(Arc::new(document)),
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn current(&self) -> Arc<Document> {
        self.snapshot.read().await.clone()
    }

    /// Look up one record
    pub async fn get(&self, name: &str) -> Result<FileRecord> {
        self.current()
            .await
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// All file names, sorted
    pub async fn list_names(&self) -> Vec<String> {
        self.current().await.files.keys().cloned().collect()
    }

    /// All records, sorted by name
    pub async fn list(&self) -> Vec<FileRecord> {
        self.current().await.files.values().cloned().collect()
    }

    /// Insert or replace the record for `record.name`
    pub async fn put(&self, record: FileRecord) -> Result<()> {
        let name = record.name.clone();
        self.mutate(move |doc| {
            if doc.files.insert(record.name.clone(), record).is_some() {
                tracing::debug!(name = %name, "replacing existing registry record");
            }
            Ok(())
        })
        .await
    }

    /// Remove a record and return it
    ///
    /// A missing name is reported as `NotFound` and the document is not rewritten.
    pub async fn delete(&self, name: &str) -> Result<FileRecord> {
        self.mutate(|doc| {
            doc.files
                .remove(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))
        })
        .await
    }

    /// Replace a file's chunk links in place
    ///
    /// `previous` are the links the replacement was derived from. If the
    /// stored links no longer equal them (the file was re-uploaded or
    /// refreshed meanwhile) nothing is written and `LinksChanged` is
    /// returned. Every other field is preserved; `refreshed_at` is stamped.
    pub async fn update_chunk_links(
        &self,
        name: &str,
        previous: &[String],
        links: Vec<String>,
    ) -> Result<FileRecord> {
        self.mutate(|doc| {
            let record = doc
                .files
                .get_mut(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;

            if record.chunk_links != previous {
                return Err(RegistryError::LinksChanged {
                    name: name.to_string(),
                }
                .into());
            }
            if links.len() != record.total_chunks {
                return Err(RegistryError::LinkCountMismatch {
                    name: name.to_string(),
                    expected: record.total_chunks,
                    actual: links.len(),
                }
                .into());
            }

            record.chunk_links = links;
            record.refreshed_at = Some(chrono::Utc::now());
            Ok(record.clone())
        })
        .await
    }

    /// Run one read-modify-write cycle
    ///
    /// The document is re-read from disk under the write lock so edits made
    /// by another process since the last mutation are not lost. If `apply`
    /// fails nothing is written.
    async fn mutate<T>(&self, apply: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let mut document = load(&self.path).await?;
        let value = apply(&mut document)?;

        write_atomic(&self.path, &document).await?;
        *self.snapshot.write().await = Arc::new(document);

        Ok(value)
    }
}

async fn load(path: &Path) -> Result<Document> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
        Err(e) => return Err(e.into()),
    };

    let (document, upgrade) = document::parse(&raw, path)?;
    if !upgrade.is_noop() {
        tracing::warn!(
            path = %path.display(),
            from_legacy = upgrade.from_legacy,
            repaired = upgrade.repaired.len(),
            "registry document upgraded in memory, rewritten on next change"
        );
    }
    Ok(document)
}

/// Write the document to a sibling temp file, fsync, then rename over `path`
async fn write_atomic(path: &Path, document: &Document) -> Result<()> {
    let body = serde_json::to_vec_pretty(document)?;
    let tmp = sibling(path, "tmp");

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&body).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    tracing::debug!(path = %path.display(), files = document.files.len(), "registry persisted");
    Ok(())
}

async fn quarantine(path: &Path) -> Result<PathBuf> {
    let aside = sibling(path, &format!("corrupt-{}", chrono::Utc::now().timestamp()));
    tokio::fs::rename(path, &aside).await?;
    Ok(aside)
}

/// `<path>.<suffix>` in the same directory
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
