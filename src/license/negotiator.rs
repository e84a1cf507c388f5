//! License negotiation against the catalog.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use crate::api::catalog::CatalogClient;
use crate::api::types::{ContentLicenseDto, LicenseResponse};
use crate::error::{Error, Result};
use crate::format::FormatChoice;
use crate::license::voucher::Voucher;
use crate::media::{AcquisitionItem, DrmType};

/// A negotiated license for one item in one format.
#[derive(Debug, Clone)]
pub struct License {
    pub item_id: String,
    pub content_url: Url,
    /// Codec the catalog granted; authoritative over the requested one.
    pub granted_codec: String,
    pub drm: DrmType,
    pub content_size: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub chapter_info: Option<serde_json::Value>,
    /// Present for DRM-wrapped content.
    pub voucher: Option<Voucher>,
    /// Served from a voucher on disk without a network call.
    pub from_cache: bool,
}

impl License {
    fn from_voucher(voucher: &Voucher) -> Result<Self> {
        let content_url = Url::parse(&voucher.content_url).map_err(|e| Error::InvalidLicense {
            item: voucher.item_id.clone(),
            reason: format!("cached content URL is malformed: {}", e),
        })?;

        Ok(Self {
            item_id: voucher.item_id.clone(),
            content_url,
            granted_codec: voucher.granted_codec.clone(),
            drm: voucher.drm,
            content_size: voucher.content_size,
            expires_at: voucher.expires_at,
            chapter_info: voucher.chapter_info.clone(),
            voucher: Some(voucher.clone()),
            from_cache: true,
        })
    }
}

/// Performs the licensing handshake for a chosen format.
///
/// Holds no per-item state and performs a single attempt per call.
pub struct LicenseNegotiator {
    catalog: Arc<dyn CatalogClient>,
    timeout: Option<Duration>,
}

impl LicenseNegotiator {
    pub fn new(catalog: Arc<dyn CatalogClient>, timeout: Option<Duration>) -> Self {
        Self { catalog, timeout }
    }

    /// Obtain a license for `item` in `choice`, reusing `cached` when it matches.
    pub async fn negotiate(
        &self,
        item: &AcquisitionItem,
        choice: &FormatChoice,
        cached: Option<&Voucher>,
    ) -> Result<License> {
        self.negotiate_at(item, choice, cached, Utc::now()).await
    }

    /// Like [`negotiate`](Self::negotiate), evaluated at `now`.
    pub async fn negotiate_at(
        &self,
        item: &AcquisitionItem,
        choice: &FormatChoice,
        cached: Option<&Voucher>,
        now: DateTime<Utc>,
    ) -> Result<License> {
        if !item.entitled {
            return Err(Error::NotEntitled(item.id.clone()));
        }

        if !item.is_published(now) {
            return Err(Error::NotYetPublished {
                item: item.id.clone(),
                available_at: item
                    .publication_date
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default(),
            });
        }

        if let Some(voucher) = cached {
            if voucher.is_reusable(&item.id, choice, now) {
                tracing::debug!(item = %item.id, "Reusing cached voucher");
                return License::from_voucher(voucher);
            }
            tracing::debug!(item = %item.id, "Cached voucher does not match, negotiating");
        }

        let response = self.request(&item.id, choice).await?;
        interpret(item, choice, response.content_license, now)
    }

    async fn request(&self, item_id: &str, choice: &FormatChoice) -> Result<LicenseResponse> {
        tracing::debug!(item = %item_id, codec = %choice.codec, "Requesting license");
        let request = self.catalog.request_license(item_id, choice);

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| Error::Timeout(format!("license request for {}", item_id)))?,
            None => request.await,
        }
    }
}

fn interpret(
    item: &AcquisitionItem,
    choice: &FormatChoice,
    license: ContentLicenseDto,
    now: DateTime<Utc>,
) -> Result<License> {
    if license.status_code.eq_ignore_ascii_case("Denied") {
        for reason in &license.license_denial_reasons {
            tracing::debug!(
                item = %item.id,
                "License denied: {}. Reason: {}. Type: {}",
                reason.message.as_deref().unwrap_or("UNKNOWN"),
                reason.rejection_reason.as_deref().unwrap_or("UNKNOWN"),
                reason.validation_type.as_deref().unwrap_or("UNKNOWN"),
            );
        }
        return Err(Error::LicenseDenied {
            item: item.id.clone(),
            message: license
                .message
                .unwrap_or_else(|| "no reason given".to_string()),
        });
    }

    let invalid = |reason: String| Error::InvalidLicense {
        item: item.id.clone(),
        reason,
    };

    let metadata = license
        .content_metadata
        .ok_or_else(|| invalid("response carries no content metadata".to_string()))?;
    let content_url = metadata
        .content_url
        .ok_or_else(|| invalid("response carries no content URL".to_string()))?;

    let raw_url = content_url
        .offline_url
        .ok_or_else(|| invalid("response carries no content URL".to_string()))?;
    let url = Url::parse(&raw_url).map_err(|e| invalid(format!("malformed content URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported URL scheme '{}'", url.scheme())));
    }

    let expires_at = match content_url.expires_at.as_deref() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| invalid(format!("unreadable expiry '{}': {}", raw, e)))?,
        ),
        None => None,
    };
    if let Some(at) = expires_at {
        if at <= now {
            return Err(invalid(format!("content URL expired at {}", at.to_rfc3339())));
        }
    }

    let reference = metadata.content_reference;
    let granted_codec = reference
        .as_ref()
        .map(|r| r.content_format.clone())
        .unwrap_or_else(|| choice.codec.clone());
    let drm = reference
        .as_ref()
        .and_then(|r| r.drm_type.as_deref())
        .and_then(DrmType::from_label)
        .unwrap_or(choice.drm);
    let content_size = reference.as_ref().and_then(|r| r.content_size_in_bytes);

    if granted_codec != choice.codec {
        tracing::info!(
            item = %item.id,
            "Requested {} but the catalog granted {}",
            choice.codec,
            granted_codec
        );
    }

    let voucher = license.license_response.map(|payload| Voucher {
        item_id: item.id.clone(),
        codec: choice.codec.clone(),
        quality: choice.quality,
        chapter_type: choice.chapter_type,
        granted_codec: granted_codec.clone(),
        drm,
        content_url: url.to_string(),
        content_size,
        expires_at,
        chapter_info: metadata.chapter_info.clone(),
        license: Some(payload),
        saved_at: now,
    });

    Ok(License {
        item_id: item.id.clone(),
        content_url: url,
        granted_codec,
        drm,
        content_size,
        expires_at,
        chapter_info: metadata.chapter_info,
        voucher,
        from_cache: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{select, Preferences};
    use crate::test_support::{legacy_book, wrapped_book, FakeCatalog, LicenseScript};
    use chrono::TimeZone;

    fn setup() -> (Arc<FakeCatalog>, LicenseNegotiator) {
        let catalog = Arc::new(FakeCatalog::new("https://cdn.example"));
        let negotiator = LicenseNegotiator::new(catalog.clone(), None);
        (catalog, negotiator)
    }

    #[tokio::test]
    async fn test_granted_license() {
        let (catalog, negotiator) = setup();
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();

        let license = negotiator.negotiate(&item, &choice, None).await.unwrap();

        assert_eq!(license.granted_codec, "LC_128_44100_stereo");
        assert_eq!(license.drm, DrmType::Adrm);
        assert_eq!(
            license.content_url.as_str(),
            "https://cdn.example/content/B000000001"
        );
        assert!(!license.from_cache);
        let voucher = license.voucher.unwrap();
        assert!(voucher.chapter_info.is_some());
        assert_eq!(catalog.license_calls(), 1);
    }

    #[tokio::test]
    async fn test_legacy_license_has_no_voucher() {
        let (_, negotiator) = setup();
        let item = legacy_book("B000000002", "Old Book");
        let choice = select(&item, &Preferences::default()).unwrap();

        let license = negotiator.negotiate(&item, &choice, None).await.unwrap();
        assert_eq!(license.drm, DrmType::Aax);
        assert!(license.voucher.is_none());
    }

    #[tokio::test]
    async fn test_not_entitled_makes_no_request() {
        let (catalog, negotiator) = setup();
        let mut item = wrapped_book("B000000001", "Book");
        item.entitled = false;
        let choice = select(&item, &Preferences::default()).unwrap();

        let err = negotiator.negotiate(&item, &choice, None).await.unwrap_err();
        assert!(matches!(err, Error::NotEntitled(_)));
        assert!(!err.is_retryable());
        assert_eq!(catalog.license_calls(), 0);
    }

    #[tokio::test]
    async fn test_not_yet_published() {
        let (catalog, negotiator) = setup();
        let mut item = wrapped_book("B000000001", "Book");
        item.publication_date = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let choice = select(&item, &Preferences::default()).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let err = negotiator
            .negotiate_at(&item, &choice, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotYetPublished { .. }));
        assert_eq!(catalog.license_calls(), 0);
    }

    #[tokio::test]
    async fn test_cached_voucher_reused_without_request() {
        let (catalog, negotiator) = setup();
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();

        let first = negotiator.negotiate(&item, &choice, None).await.unwrap();
        let voucher = first.voucher.unwrap();

        let second = negotiator
            .negotiate(&item, &choice, Some(&voucher))
            .await
            .unwrap();

        assert!(second.from_cache);
        assert_eq!(second.content_url, first.content_url);
        assert_eq!(catalog.license_calls(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_voucher_renegotiates() {
        let (catalog, negotiator) = setup();
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();
        let voucher = negotiator
            .negotiate(&item, &choice, None)
            .await
            .unwrap()
            .voucher
            .unwrap();

        let mut flat = choice.clone();
        flat.chapter_type = crate::config::ChapterType::Flat;
        let license = negotiator
            .negotiate(&item, &flat, Some(&voucher))
            .await
            .unwrap();

        assert!(!license.from_cache);
        assert_eq!(catalog.license_calls(), 2);
    }

    #[tokio::test]
    async fn test_denied_is_permanent() {
        let (catalog, negotiator) = setup();
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();
        catalog.script("B000000001", [LicenseScript::Denied]);

        let err = negotiator.negotiate(&item, &choice, None).await.unwrap_err();
        assert!(matches!(err, Error::LicenseDenied { .. }));
        assert_eq!(err.retry_budget(3), 0);
    }

    #[tokio::test]
    async fn test_expired_or_malformed_url_is_invalid() {
        let (catalog, negotiator) = setup();
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();
        catalog.script(
            "B000000001",
            [LicenseScript::ExpiredUrl, LicenseScript::MalformedUrl],
        );

        let err = negotiator.negotiate(&item, &choice, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidLicense { .. }));
        assert_eq!(err.retry_budget(3), 1);

        let err = negotiator.negotiate(&item, &choice, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidLicense { .. }));
    }

    #[tokio::test]
    async fn test_granted_codec_is_authoritative() {
        let (catalog, negotiator) = setup();
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();
        catalog.script(
            "B000000001",
            [LicenseScript::Grant("LC_64_44100_stereo".to_string())],
        );

        let license = negotiator.negotiate(&item, &choice, None).await.unwrap();
        assert_eq!(license.granted_codec, "LC_64_44100_stereo");

        let voucher = license.voucher.unwrap();
        assert_eq!(voucher.codec, "LC_128_44100_stereo");
        assert_eq!(voucher.granted_codec, "LC_64_44100_stereo");
    }

    #[tokio::test]
    async fn test_request_timeout_is_retryable() {
        let catalog = Arc::new(
            FakeCatalog::new("https://cdn.example").with_license_delay(Duration::from_millis(500)),
        );
        let negotiator = LicenseNegotiator::new(catalog, Some(Duration::from_millis(20)));
        let item = wrapped_book("B000000001", "Book");
        let choice = select(&item, &Preferences::default()).unwrap();

        let err = negotiator.negotiate(&item, &choice, None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
    }
}
