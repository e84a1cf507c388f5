//! Catalog item parsing utilities.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::api::types::{CodecDto, ItemDto};
use crate::media::item::{AcquisitionItem, DrmType, Encoding, ItemKind};

/// Publication timestamp format used by the catalog.
const PUBLICATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse a catalog item into an AcquisitionItem.
///
/// Returns `None` for records without a usable identifier.
pub fn parse_item(dto: &ItemDto) -> Option<AcquisitionItem> {
    let id = dto.asin.trim();
    if id.is_empty() {
        return None;
    }

    let kind = item_kind(dto);
    let title = dto.title.clone().unwrap_or_else(|| id.to_string());
    let mut item = AcquisitionItem::new(id, kind, title);

    item.subtitle = dto.subtitle.clone();
    item.series = dto
        .series
        .as_ref()
        .and_then(|s| s.first())
        .map(|s| s.title.clone());
    item.publication_date = dto
        .publication_datetime
        .as_deref()
        .and_then(parse_publication_date);
    item.encodings = dto
        .available_codecs
        .iter()
        .flatten()
        .filter_map(parse_codec)
        .collect();
    // Missing rights means the catalog did not vouch for the item.
    item.entitled = dto
        .customer_rights
        .as_ref()
        .map(|r| r.is_consumable_offline)
        .unwrap_or(false);
    item.is_ayce = dto.is_ayce.unwrap_or(false);
    item.child_count = if kind.is_parent() {
        dto.episode_count
    } else {
        None
    };
    item.cover_urls = dto
        .product_images
        .iter()
        .flatten()
        .filter_map(|(size, url)| size.trim().parse::<u32>().ok().map(|s| (s, url.clone())))
        .collect();
    item.pdf_url = dto.pdf_url.clone();

    Some(item)
}

/// Derive the item kind from delivery and content types.
fn item_kind(dto: &ItemDto) -> ItemKind {
    let delivery = dto.content_delivery_type.as_deref().unwrap_or("");
    let content = dto.content_type.as_deref().unwrap_or("");
    let has_children = dto.has_children.unwrap_or(false);

    match (delivery, content) {
        ("Periodical" | "PodcastParent", _) if has_children => ItemKind::PodcastParent,
        (_, "Podcast") if has_children => ItemKind::PodcastParent,
        ("MultiPartBook", _) if has_children => ItemKind::MultiPartBook,
        ("PodcastEpisode", _) | (_, "Episode") => ItemKind::PodcastEpisode,
        ("BookPart", _) => ItemKind::BookPart,
        _ => ItemKind::Book,
    }
}

fn parse_publication_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, PUBLICATION_FORMAT)
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn codec_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // aax_44_128, mp4_22_32, mp3_44_64: sample rate (kHz) and bitrate (kbit/s)
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(aax|mp4|mp3)_(\d+)_(\d+)$").expect("valid regex"))
}

fn enhanced_codec_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // LC_128_44100_stereo: bitrate (kbit/s) and sample rate (Hz)
    PATTERN.get_or_init(|| Regex::new(r"(?i)^[a-z]+_(\d+)_(\d+)").expect("valid regex"))
}

/// Parse one codec entry into an Encoding.
pub fn parse_codec(dto: &CodecDto) -> Option<Encoding> {
    if let Some(caps) = codec_name_pattern().captures(&dto.name) {
        let container = caps[1].to_lowercase();
        let sample_khz: u32 = caps[2].parse().ok()?;
        let bitrate: u32 = caps[3].parse().ok()?;

        let drm = match dto.format.as_deref().map(str::to_uppercase).as_deref() {
            Some("AAXC") => DrmType::Adrm,
            Some("MPEG") | Some("MP3") => DrmType::Mpeg,
            Some("AAX") => DrmType::Aax,
            _ if container == "mp3" => DrmType::Mpeg,
            _ if container == "mp4" => DrmType::Adrm,
            _ => DrmType::Aax,
        };

        let codec = match drm {
            DrmType::Aax => dto.name.to_uppercase(),
            _ => dto.enhanced_codec.clone().unwrap_or_else(|| dto.name.clone()),
        };

        return Some(Encoding {
            codec,
            drm,
            sample_rate: normalize_sample_rate(sample_khz),
            bitrate,
        });
    }

    let enhanced = dto.enhanced_codec.as_deref()?;
    let caps = enhanced_codec_pattern().captures(enhanced)?;
    let bitrate: u32 = caps[1].parse().ok()?;
    let sample_rate: u32 = caps[2].parse().ok()?;

    Some(Encoding {
        codec: enhanced.to_string(),
        drm: DrmType::Adrm,
        sample_rate,
        bitrate,
    })
}

/// Codec names abbreviate sample rates (`22` = 22050 Hz, `44` = 44100 Hz).
fn normalize_sample_rate(khz: u32) -> u32 {
    match khz {
        22 => 22_050,
        44 => 44_100,
        48 => 48_000,
        other if other < 1000 => other * 1000,
        other => other,
    }
}
