//! Resume-state sidecar records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sidecar format version; other versions are discarded.
pub const RESUME_VERSION: u32 = 1;

/// One independently resumable byte range of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub index: usize,
    /// First byte of the part in the final file.
    pub start: u64,
    /// One past the last byte; unknown for single-part transfers of unknown size.
    pub end: Option<u64>,
    /// Bytes of this part committed to its staging file.
    pub committed: u64,
    pub complete: bool,
}

impl PartRecord {
    /// Absolute offset the next byte of this part belongs to.
    pub fn offset(&self) -> u64 {
        self.start + self.committed
    }

    /// Bytes still missing, when the part length is known.
    pub fn remaining(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.offset()))
    }
}

/// Persisted record of committed byte ranges for one target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub version: u32,
    /// Identity of the requested format; a change invalidates the record.
    pub format_key: String,
    pub expected_size: Option<u64>,
    pub parts: Vec<PartRecord>,
}

impl ResumeState {
    /// A single part covering the whole asset.
    pub fn single(format_key: &str, expected_size: Option<u64>) -> Self {
        Self {
            version: RESUME_VERSION,
            format_key: format_key.to_string(),
            expected_size,
            parts: vec![PartRecord {
                index: 0,
                start: 0,
                end: expected_size,
                committed: 0,
                complete: false,
            }],
        }
    }

    /// Split into `part_size` parts when the asset is larger than `threshold`.
    pub fn plan(
        format_key: &str,
        expected_size: Option<u64>,
        threshold: u64,
        part_size: u64,
    ) -> Self {
        let size = match expected_size {
            Some(size) if size > threshold && part_size > 0 => size,
            _ => return Self::single(format_key, expected_size),
        };

        let mut parts = Vec::new();
        let mut start = 0;
        while start < size {
            let end = start.saturating_add(part_size).min(size);
            parts.push(PartRecord {
                index: parts.len(),
                start,
                end: Some(end),
                committed: 0,
                complete: false,
            });
            start = end;
        }

        Self {
            version: RESUME_VERSION,
            format_key: format_key.to_string(),
            expected_size,
            parts,
        }
    }

    /// Whether this record may be resumed for the given format and size.
    pub fn is_compatible(&self, format_key: &str, expected_size: Option<u64>) -> bool {
        self.version == RESUME_VERSION
            && self.format_key == format_key
            && self.expected_size == expected_size
            && !self.parts.is_empty()
    }

    /// Total committed bytes across all parts.
    pub fn committed(&self) -> u64 {
        self.parts.iter().map(|p| p.committed).sum()
    }

    pub fn next_incomplete(&self) -> Option<usize> {
        self.parts.iter().position(|p| !p.complete)
    }

    pub fn is_complete(&self) -> bool {
        self.next_incomplete().is_none()
    }

    /// Load a sidecar; a missing file yields `None`, a corrupt one is ignored.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::from_io(path, e)),
        };

        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!("Ignoring corrupt resume state {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Write the sidecar atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec(self)?;

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::from_io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::from_io(path, e))
    }

    /// Delete a sidecar if present.
    pub async fn remove(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(path, e)),
        }
    }
}
