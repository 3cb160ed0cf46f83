//! Error types for attachvault
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (transfer, registry)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for attachvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for attachvault
///
/// Each variant carries enough context to tell which file, chunk or URL
/// was involved.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "transfer.max_chunk_size")
        key: Option<String>,
    },

    /// No file with this name exists in the registry
    #[error("file not found: {0}")]
    NotFound(String),

    /// The file name cannot be used as a registry key
    #[error("invalid file name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Zero-byte uploads are rejected rather than stored as empty records
    #[error("refusing to store empty file {0}")]
    EmptyUpload(String),

    /// The caller announced a size that does not match the bytes received
    #[error("size mismatch for {name}: announced {expected} bytes, received {actual}")]
    SizeMismatch {
        /// File being uploaded
        name: String,
        /// Size the caller announced
        expected: u64,
        /// Bytes actually read from the stream
        actual: u64,
    },

    /// Chunk upload, refresh or fetch failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Link registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The attachment host answered with an error
    #[error("attachment host error{}: {message}", status_suffix(.status))]
    Host {
        /// HTTP status returned by the host, if the request got that far
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// A network call exceeded its configured timeout
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Which call timed out (upload, refresh, fetch)
        operation: &'static str,
        /// The timeout that elapsed
        seconds: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new transfers
    #[error("shutdown in progress: not accepting new transfers")]
    ShuttingDown,

    /// A download stream was cancelled through its cancellation hook
    #[error("transfer of {0} was cancelled")]
    Cancelled(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Errors raised while moving chunks to or from the attachment host
#[derive(Debug, Error)]
pub enum TransferError {
    /// The host rejected or failed a chunk upload; the whole upload is aborted
    #[error("upload of {name} chunk {index} failed: {reason}")]
    UploadChunkFailed {
        /// File being uploaded
        name: String,
        /// 1-based chunk index
        index: usize,
        /// Underlying failure
        reason: String,
    },

    /// A refresh batch failed; nothing from the refresh is kept
    #[error("link refresh failed at batch {batch}: {reason}")]
    RefreshFailed {
        /// 0-based batch number
        batch: usize,
        /// Underlying failure
        reason: String,
    },

    /// A chunk could not be fetched while streaming a download
    #[error("failed to download chunk {index} from {url}: {reason}")]
    ChunkFetchFailed {
        /// 1-based chunk index
        index: usize,
        /// URL that failed
        url: String,
        /// Underlying failure
        reason: String,
    },
}

/// Link registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The persisted document could not be parsed
    #[error("registry document {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the document
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// The persisted document was written by a newer version
    #[error("registry document version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found on disk
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// A link replacement did not match the stored chunk count
    #[error("{name} has {expected} chunks but {actual} links were supplied")]
    LinkCountMismatch {
        /// File whose links were being replaced
        name: String,
        /// Stored chunk count
        expected: usize,
        /// Number of links supplied
        actual: usize,
    },

    /// The stored links changed while a refresh of them was in flight
    #[error("links of {name} changed during refresh")]
    LinksChanged {
        /// File whose links were being replaced
        name: String,
    },
}

/// API error response format
///
/// Returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "file not found: movie.mkv"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "upload_chunk_failed")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidName { .. } => 400,
            Error::EmptyUpload(_) => 400,
            Error::SizeMismatch { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict
            Error::Registry(RegistryError::LinkCountMismatch { .. }) => 409,
            Error::Registry(RegistryError::LinksChanged { .. }) => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Registry(RegistryError::Corrupt { .. }) => 500,
            Error::Registry(RegistryError::UnsupportedVersion { .. }) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Cancelled(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - Attachment host failures
            Error::Transfer(_) => 502,
            Error::Host { .. } => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 504 Gateway Timeout
            Error::Timeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidName { .. } => "invalid_name",
            Error::EmptyUpload(_) => "empty_upload",
            Error::SizeMismatch { .. } => "size_mismatch",
            Error::Transfer(e) => match e {
                TransferError::UploadChunkFailed { .. } => "upload_chunk_failed",
                TransferError::RefreshFailed { .. } => "refresh_failed",
                TransferError::ChunkFetchFailed { .. } => "chunk_fetch_failed",
            },
            Error::Registry(e) => match e {
                RegistryError::Corrupt { .. } => "registry_corrupt",
                RegistryError::UnsupportedVersion { .. } => "registry_unsupported_version",
                RegistryError::LinkCountMismatch { .. } => "link_count_mismatch",
                RegistryError::LinksChanged { .. } => "links_changed",
            },
            Error::Host { .. } => "host_error",
            Error::Timeout { .. } => "timeout",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Cancelled(_) => "cancelled",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Transfer(TransferError::UploadChunkFailed { name, index, .. }) => {
                Some(serde_json::json!({
                    "name": name,
                    "chunk": index,
                }))
            }
            Error::Transfer(TransferError::RefreshFailed { batch, .. }) => {
                Some(serde_json::json!({
                    "batch": batch,
                }))
            }
            Error::Transfer(TransferError::ChunkFetchFailed { index, url, .. }) => {
                Some(serde_json::json!({
                    "chunk": index,
                    "url": url,
                }))
            }
            Error::Registry(RegistryError::LinkCountMismatch {
                name,
                expected,
                actual,
            }) => Some(serde_json::json!({
                "name": name,
                "expected": expected,
                "actual": actual,
            })),
            Error::SizeMismatch {
                expected, actual, ..
            } => Some(serde_json::json!({
                "expected_bytes": expected,
                "actual_bytes": actual,
            })),
            Error::Host {
                status: Some(status),
                ..
            } => Some(serde_json::json!({
                "host_status": status,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
