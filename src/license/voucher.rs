//! Persisted license vouchers.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ChapterType, Quality};
use crate::error::{Error, Result};
use crate::format::FormatChoice;
use crate::media::DrmType;

/// A license record saved next to the download so later runs can skip
/// negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub item_id: String,

    /// Codec that was requested.
    pub codec: String,

    pub quality: Quality,

    pub chapter_type: ChapterType,

    /// Codec the catalog actually granted.
    pub granted_codec: String,

    pub drm: DrmType,

    pub content_url: String,

    #[serde(default)]
    pub content_size: Option<u64>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub chapter_info: Option<serde_json::Value>,

    /// DRM payload (key, iv, rules) as returned by the catalog.
    #[serde(default)]
    pub license: Option<serde_json::Value>,

    pub saved_at: DateTime<Utc>,
}

impl Voucher {
    /// Whether this voucher was issued for `item_id` in the chosen format.
    pub fn matches(&self, item_id: &str, choice: &FormatChoice) -> bool {
        self.item_id == item_id
            && self.codec == choice.codec
            && self.quality == choice.quality
            && self.chapter_type == choice.chapter_type
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Whether the voucher can stand in for a fresh negotiation.
    pub fn is_reusable(&self, item_id: &str, choice: &FormatChoice, now: DateTime<Utc>) -> bool {
        self.matches(item_id, choice) && !self.is_expired(now)
    }
}

/// Load a voucher file.
///
/// A missing file yields `None`; an unreadable one is logged and ignored so
/// negotiation can replace it.
pub async fn load_voucher(path: &Path) -> Result<Option<Voucher>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::from_io(path, e)),
    };

    match serde_json::from_str(&content) {
        Ok(voucher) => Ok(Some(voucher)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable voucher {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Save a voucher file atomically.
pub async fn save_voucher(path: &Path, voucher: &Voucher) -> Result<()> {
    let content = serde_json::to_string_pretty(voucher)?;

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".part");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| Error::from_io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::from_io(path, e))?;

    tracing::debug!("Saved voucher {}", path.display());
    Ok(())
}
