//! Core types and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One logical uploaded file and the ordered links of its chunks
///
/// `chunk_links` order is upload order and the order the file is reassembled in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    /// Unique registry key
    #[serde(alias = "file_name")]
    pub name: String,

    /// Number of chunks; always equal to `chunk_links.len()`
    pub total_chunks: usize,

    /// Attachment URLs, one per chunk, in reassembly order
    pub chunk_links: Vec<String>,

    /// Total bytes stored (absent for records written by older versions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// When the upload completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,

    /// Last successful link refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Build a freshly uploaded record
    pub fn new(name: impl Into<String>, chunk_links: Vec<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            total_chunks: chunk_links.len(),
            chunk_links,
            size_bytes: Some(size_bytes),
            uploaded_at: Some(Utc::now()),
            refreshed_at: None,
        }
    }
}

/// File summary returned by listing endpoints (links omitted)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileInfo {
    /// File name
    pub name: String,
    /// Number of chunks
    pub total_chunks: usize,
    /// Total size in bytes, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// When the upload completed, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        Self {
            name: record.name.clone(),
            total_chunks: record.total_chunks,
            size_bytes: record.size_bytes,
            uploaded_at: record.uploaded_at,
        }
    }
}

/// Event emitted during upload, refresh, download and delete
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Upload accepted, first chunk about to be read
    UploadStarted {
        /// File name
        name: String,
        /// Size announced by the caller
        #[serde(skip_serializing_if = "Option::is_none")]
        total_size: Option<u64>,
    },

    /// One chunk stored on the host
    ChunkUploaded {
        /// File name
        name: String,
        /// 1-based chunk index
        index: usize,
        /// Bytes uploaded so far across completed chunks
        bytes_uploaded: u64,
    },

    /// All chunks stored and the record written
    UploadComplete {
        /// File name
        name: String,
        /// Number of chunks
        total_chunks: usize,
        /// Total bytes
        size_bytes: u64,
    },

    /// Upload aborted; no record was written
    UploadFailed {
        /// File name
        name: String,
        /// Error message
        error: String,
    },

    /// Links refreshed and persisted
    LinksRefreshed {
        /// File name
        name: String,
        /// Number of links refreshed
        count: usize,
    },

    /// Download stream handed to the caller
    DownloadStarted {
        /// File name
        name: String,
        /// Number of chunks that will be streamed
        total_chunks: usize,
    },

    /// Record removed from the registry
    Deleted {
        /// File name
        name: String,
    },

    /// Vault is shutting down
    Shutdown,
}
