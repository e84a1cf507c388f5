//! Acquisition item representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::FilenameMode;
use crate::fs::naming::sanitize_path_component;

/// Kind of catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A regular audiobook.
    Book,
    /// A podcast show; its episodes are separate items.
    PodcastParent,
    /// A single podcast episode.
    PodcastEpisode,
    /// A book delivered as several parts.
    MultiPartBook,
    /// One part of a multi-part book.
    BookPart,
}

impl ItemKind {
    /// Whether items of this kind stand for a set of children.
    pub fn is_parent(&self) -> bool {
        matches!(self, ItemKind::PodcastParent | ItemKind::MultiPartBook)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Book => write!(f, "book"),
            ItemKind::PodcastParent => write!(f, "podcast"),
            ItemKind::PodcastEpisode => write!(f, "episode"),
            ItemKind::MultiPartBook => write!(f, "multi-part book"),
            ItemKind::BookPart => write!(f, "book part"),
        }
    }
}

/// Grouping of encodings sharing a DRM/container scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    /// Delivered through a license request with a voucher (AAXC, MPEG).
    #[default]
    Wrapped,
    /// Legacy single-file AAX delivery without a voucher.
    Legacy,
}

impl CodecFamily {
    /// The other family, used when falling back.
    pub fn alternate(&self) -> Self {
        match self {
            CodecFamily::Wrapped => CodecFamily::Legacy,
            CodecFamily::Legacy => CodecFamily::Wrapped,
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecFamily::Wrapped => write!(f, "wrapped"),
            CodecFamily::Legacy => write!(f, "legacy"),
        }
    }
}

impl std::str::FromStr for CodecFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wrapped" | "aaxc" => Ok(CodecFamily::Wrapped),
            "legacy" | "aax" => Ok(CodecFamily::Legacy),
            _ => Err(format!("Unknown codec family: {}", s)),
        }
    }
}

/// DRM scheme of an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrmType {
    Adrm,
    Aax,
    Mpeg,
}

impl DrmType {
    /// The codec family this DRM scheme belongs to.
    pub fn family(&self) -> CodecFamily {
        match self {
            DrmType::Adrm | DrmType::Mpeg => CodecFamily::Wrapped,
            DrmType::Aax => CodecFamily::Legacy,
        }
    }

    /// Label used by the license API.
    pub fn as_str(&self) -> &'static str {
        match self {
            DrmType::Adrm => "Adrm",
            DrmType::Aax => "Aax",
            DrmType::Mpeg => "Mpeg",
        }
    }

    /// Parse a license API label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "adrm" => Some(DrmType::Adrm),
            "aax" => Some(DrmType::Aax),
            "mpeg" => Some(DrmType::Mpeg),
            _ => None,
        }
    }
}

/// Coarse quality tier of an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Normal,
    High,
}

impl QualityTier {
    /// Tier for a bitrate in kbit/s.
    pub fn from_bitrate(kbps: u32) -> Self {
        match kbps {
            0..=63 => QualityTier::Low,
            64..=127 => QualityTier::Normal,
            _ => QualityTier::High,
        }
    }
}

/// One available encoding of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// Codec label as the catalog names it (e.g. `LC_128_44100_stereo`).
    pub codec: String,
    pub drm: DrmType,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bitrate in kbit/s.
    pub bitrate: u32,
}

impl Encoding {
    pub fn family(&self) -> CodecFamily {
        self.drm.family()
    }

    pub fn tier(&self) -> QualityTier {
        QualityTier::from_bitrate(self.bitrate)
    }
}

/// Reference from a derived child item back to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: String,
    pub title: String,
    pub kind: ItemKind,
}

/// A single unit of acquisition work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionItem {
    /// Stable catalog identifier (ASIN).
    pub id: String,

    pub kind: ItemKind,

    pub title: String,

    pub subtitle: Option<String>,

    pub series: Option<String>,

    pub publication_date: Option<DateTime<Utc>>,

    pub encodings: Vec<Encoding>,

    /// Customer rights: whether the account may download the item.
    pub entitled: bool,

    /// Subscription catalog title, never offered in the legacy family.
    pub is_ayce: bool,

    /// Number of children announced by the catalog, for parents.
    pub child_count: Option<u32>,

    /// Cover URLs keyed by pixel size.
    pub cover_urls: BTreeMap<u32, String>,

    pub pdf_url: Option<String>,

    pub parent: Option<ParentRef>,
}

impl AcquisitionItem {
    /// Create a minimal, entitled item.
    pub fn new(id: impl Into<String>, kind: ItemKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            subtitle: None,
            series: None,
            publication_date: None,
            encodings: Vec::new(),
            entitled: true,
            is_ayce: false,
            child_count: None,
            cover_urls: BTreeMap::new(),
            pdf_url: None,
            parent: None,
        }
    }

    /// Title including subtitle and, for children, the parent title.
    pub fn full_title(&self) -> String {
        let mut title = self.title.clone();
        if let Some(subtitle) = &self.subtitle {
            title = format!("{}: {}", title, subtitle);
        }
        if let Some(parent) = &self.parent {
            title = format!("{}: {}", parent.title, title);
        }
        title
    }

    /// Whether the item has been published as of `now`.
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.publication_date.map(|date| date <= now).unwrap_or(true)
    }

    /// ASCII slug of the full title, falling back to the id when too short.
    pub fn full_title_slug(&self) -> String {
        slugify(&self.full_title()).unwrap_or_else(|| self.id.clone())
    }

    /// Build the base filename (without extension) for this item.
    pub fn create_base_filename(&self, mode: FilenameMode) -> String {
        let base = match mode {
            FilenameMode::Ascii | FilenameMode::AsinAscii => self.full_title_slug(),
            FilenameMode::Unicode | FilenameMode::AsinUnicode => {
                sanitize_path_component(&self.full_title()).unwrap_or_else(|_| self.id.clone())
            }
        };

        match mode {
            FilenameMode::AsinAscii | FilenameMode::AsinUnicode => {
                format!("{}_{}", self.id, base)
            }
            _ => base,
        }
    }

    /// Derive a child item of this parent.
    pub fn child(&self, mut child: AcquisitionItem) -> AcquisitionItem {
        child.parent = Some(ParentRef {
            id: self.id.clone(),
            title: self.title.clone(),
            kind: self.kind,
        });
        child
    }
}

/// Keep ASCII letters, digits and `-_.()`, turning spaces into underscores.
fn slugify(title: &str) -> Option<String> {
    let slug: String = title
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || "-_.()".contains(c) => Some(c),
            _ => None,
        })
        .collect();

    if slug.len() < 2 {
        None
    } else {
        Some(slug)
    }
}
