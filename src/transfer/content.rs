//! Response validation before any byte is committed.

use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// What kind of asset a transfer fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Audio,
    Image,
    Document,
}

impl AssetKind {
    /// Whether a declared content type is acceptable for this asset.
    pub fn accepts(&self, content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let octet_stream = mime == "application/octet-stream" || mime == "binary/octet-stream";

        match self {
            AssetKind::Audio => mime.starts_with("audio/") || octet_stream,
            AssetKind::Image => mime.starts_with("image/"),
            AssetKind::Document => mime == "application/pdf" || octet_stream,
        }
    }
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;

    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };

    if end < start {
        return None;
    }

    Some(ContentRange { start, end, total })
}

/// Check declared type and length of a response.
///
/// A missing `Content-Type` is accepted; a declared one must fit `kind`.
/// `expected_len` is the number of body bytes still missing, when known.
pub fn validate_response(
    kind: AssetKind,
    url: &Url,
    headers: &HeaderMap,
    expected_len: Option<u64>,
) -> Result<()> {
    if let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        if !kind.accepts(content_type) {
            return Err(Error::UnexpectedContent {
                url: url.to_string(),
                reason: format!("content type '{}' is not valid for {:?}", content_type, kind),
            });
        }
    }

    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let (Some(declared), Some(expected)) = (declared, expected_len) {
        if declared != expected {
            return Err(Error::UnexpectedContent {
                url: url.to_string(),
                reason: format!(
                    "declared length {} does not match expected {}",
                    declared, expected
                ),
            });
        }
    }

    Ok(())
}
