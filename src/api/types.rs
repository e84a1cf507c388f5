//! Catalog API response types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generic paged listing wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<ItemDto>,

    #[serde(default)]
    pub total_results: Option<u64>,
}

/// Single item lookup wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: ItemDto,
}

/// Catalog item as returned by the API (and accepted by `--items-file`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDto {
    pub asin: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub series: Option<Vec<SeriesDto>>,

    /// E.g. `SinglePartBook`, `MultiPartBook`, `Periodical`, `PodcastParent`.
    #[serde(default)]
    pub content_delivery_type: Option<String>,

    /// E.g. `Product`, `Podcast`, `Episode`.
    #[serde(default)]
    pub content_type: Option<String>,

    /// Format `%Y-%m-%dT%H:%M:%SZ`.
    #[serde(default)]
    pub publication_datetime: Option<String>,

    #[serde(default)]
    pub available_codecs: Option<Vec<CodecDto>>,

    #[serde(default)]
    pub customer_rights: Option<CustomerRightsDto>,

    #[serde(default)]
    pub is_ayce: Option<bool>,

    #[serde(default)]
    pub has_children: Option<bool>,

    #[serde(default)]
    pub episode_count: Option<u32>,

    #[serde(default)]
    pub product_images: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDto {
    pub title: String,

    #[serde(default)]
    pub sequence: Option<String>,
}

/// Codec entry: `name` like `aax_44_128`, `enhanced_codec` like `LC_128_44100_stereo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecDto {
    pub name: String,

    #[serde(default)]
    pub enhanced_codec: Option<String>,

    /// `AAX`, `AAXC` or `MPEG`; derived from the name when absent.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRightsDto {
    pub is_consumable_offline: bool,
}

/// License request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRequestBody {
    pub codec: String,
    pub supported_drm_types: Vec<String>,
    pub quality: String,
    pub chapter_titles_type: String,
    pub consumption_type: String,
    pub response_groups: String,
}

/// License response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseResponse {
    pub content_license: ContentLicenseDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentLicenseDto {
    /// `Granted` or `Denied`.
    pub status_code: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub license_denial_reasons: Vec<DenialReasonDto>,

    #[serde(default)]
    pub content_metadata: Option<ContentMetadataDto>,

    /// Decrypted voucher (key, iv, refresh date, rules).
    #[serde(default)]
    pub license_response: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialReasonDto {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default, rename = "rejectionReason")]
    pub rejection_reason: Option<String>,

    #[serde(default, rename = "validationType")]
    pub validation_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentMetadataDto {
    #[serde(default)]
    pub content_url: Option<ContentUrlDto>,

    #[serde(default)]
    pub content_reference: Option<ContentReferenceDto>,

    #[serde(default)]
    pub chapter_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUrlDto {
    #[serde(default)]
    pub offline_url: Option<String>,

    /// RFC 3339 expiry of `offline_url`.
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentReferenceDto {
    /// Granted codec, e.g. `AAX_44_128` or `mp4_22_32`.
    pub content_format: String,

    /// `Adrm`, `Mpeg` or `Aax`.
    #[serde(default)]
    pub drm_type: Option<String>,

    #[serde(default)]
    pub content_size_in_bytes: Option<u64>,
}
