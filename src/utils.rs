//! Utility functions for names, labels and headers

use crate::error::{Error, Result};

/// Longest accepted file name in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Check that a name can be used as a registry key and attachment label
///
/// Names travel through URLs, attachment filenames and the
/// `Content-Disposition` header, so path separators and control characters
/// are rejected.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is longer than 255 bytes")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else if name.chars().any(char::is_control) {
        Some("name contains control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Attachment filename for a chunk: `<name>.part<index>` with a 1-based index
pub fn chunk_label(name: &str, index: usize) -> String {
    format!("{name}.part{index}")
}

/// Build a `Content-Disposition: attachment` value that survives non-ASCII names
///
/// The plain `filename` parameter gets an ASCII fallback; `filename*` carries
/// the exact name percent-encoded per RFC 5987.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

/// Derive a file name from a path, falling back to "upload"
pub fn file_name_from_path(path: &std::path::Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload")
        .to_string()
}
