//! On-disk registry document and its legacy upgrade path

use crate::error::{RegistryError, Result};
use crate::types::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Document version written by this build
pub(crate) const CURRENT_VERSION: u32 = 1;

/// The persisted registry: `{"version": 1, "files": {name: FileRecord}}`
///
/// Files are kept in a `BTreeMap` so listings come out sorted by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Document {
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) files: BTreeMap<String, FileRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            files: BTreeMap::new(),
        }
    }
}

/// Record shape written before the document was versioned
#[derive(Deserialize)]
struct LegacyRecord {
    #[serde(default)]
    total_chunks: usize,
    #[serde(default)]
    chunk_links: Vec<String>,
}

/// How a parsed document differed from the current format
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Upgrade {
    /// The document had no version and was read as a bare name map
    pub(crate) from_legacy: bool,
    /// Records whose name or chunk count had to be corrected
    pub(crate) repaired: Vec<String>,
}

impl Upgrade {
    pub(crate) fn is_noop(&self) -> bool {
        !self.from_legacy && self.repaired.is_empty()
    }
}

/// Parse raw document bytes
///
/// Empty or whitespace-only input is an empty registry.
pub(crate) fn parse(raw: &[u8], path: &Path) -> Result<(Document, Upgrade)> {
    let corrupt = |reason: String| RegistryError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok((Document::default(), Upgrade::default()));
    }

    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| corrupt(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| corrupt("top level is not a JSON object".into()))?;

    let mut upgrade = Upgrade::default();
    let mut document = match object.get("version") {
        Some(version) => {
            let found = version
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| corrupt(format!("version {version} is not a number")))?;
            if found > CURRENT_VERSION {
                return Err(RegistryError::UnsupportedVersion {
                    found,
                    supported: CURRENT_VERSION,
                }
                .into());
            }
            serde_json::from_value::<Document>(value).map_err(|e| corrupt(e.to_string()))?
        }
        None => {
            upgrade.from_legacy = true;
            let legacy: BTreeMap<String, LegacyRecord> =
                serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
            let files = legacy
                .into_iter()
                .map(|(name, old)| {
                    let record = FileRecord {
                        name: name.clone(),
                        total_chunks: old.total_chunks,
                        chunk_links: old.chunk_links,
                        size_bytes: None,
                        uploaded_at: None,
                        refreshed_at: None,
                    };
                    (name, record)
                })
                .collect();
            Document {
                version: CURRENT_VERSION,
                files,
            }
        }
    };

    for (key, record) in document.files.iter_mut() {
        let mut repaired = false;
        if record.name != *key {
            record.name = key.clone();
            repaired = true;
        }
        if record.total_chunks != record.chunk_links.len() {
            tracing::warn!(
                name = %key,
                total_chunks = record.total_chunks,
                links = record.chunk_links.len(),
                "chunk count disagrees with link count, using link count"
            );
            record.total_chunks = record.chunk_links.len();
            repaired = true;
        }
        if repaired {
            upgrade.repaired.push(key.clone());
        }
    }
    document.version = CURRENT_VERSION;

    Ok((document, upgrade))
}
