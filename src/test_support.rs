//! In-memory catalog used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::catalog::CatalogClient;
use crate::api::types::{
    ContentLicenseDto, ContentMetadataDto, ContentReferenceDto, ContentUrlDto, DenialReasonDto,
    LicenseResponse,
};
use crate::error::{Error, Result};
use crate::format::FormatChoice;
use crate::media::{AcquisitionItem, DrmType, Encoding, ItemKind};

/// Scripted outcome for the next license request of an item.
#[derive(Debug, Clone)]
pub enum LicenseScript {
    Timeout,
    Denied,
    ExpiredUrl,
    MalformedUrl,
    /// Grant a different codec than requested.
    Grant(String),
}

#[derive(Default)]
pub struct FakeCatalog {
    pub library: Vec<AcquisitionItem>,
    pub children: HashMap<String, Vec<AcquisitionItem>>,
    /// Base URL content URLs are built from (usually a mock server).
    pub content_base: String,
    /// Content sizes announced in granted licenses.
    pub sizes: HashMap<String, u64>,
    pub license_delay: Duration,
    pub annotations: Option<serde_json::Value>,
    scripts: Mutex<HashMap<String, VecDeque<LicenseScript>>>,
    license_calls: AtomicUsize,
    children_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(content_base: impl Into<String>) -> Self {
        Self {
            content_base: content_base.into(),
            ..Self::default()
        }
    }

    pub fn with_license_delay(mut self, delay: Duration) -> Self {
        self.license_delay = delay;
        self
    }

    /// Queue scripted outcomes for an item; later requests are granted.
    pub fn script(&self, item_id: &str, outcomes: impl IntoIterator<Item = LicenseScript>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(item_id.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn license_calls(&self) -> usize {
        self.license_calls.load(Ordering::SeqCst)
    }

    pub fn children_calls(&self) -> usize {
        self.children_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_licenses(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn granted(&self, item_id: &str, codec: &str, drm: DrmType, url: String) -> LicenseResponse {
        LicenseResponse {
            content_license: ContentLicenseDto {
                status_code: "Granted".to_string(),
                message: None,
                license_denial_reasons: Vec::new(),
                content_metadata: Some(ContentMetadataDto {
                    content_url: Some(ContentUrlDto {
                        offline_url: Some(url),
                        expires_at: None,
                    }),
                    content_reference: Some(ContentReferenceDto {
                        content_format: codec.to_string(),
                        drm_type: Some(drm.as_str().to_string()),
                        content_size_in_bytes: self.sizes.get(item_id).copied(),
                    }),
                    chapter_info: Some(serde_json::json!({ "chapters": [{ "title": "One" }] })),
                }),
                license_response: match drm {
                    DrmType::Aax => None,
                    _ => Some(serde_json::json!({ "key": "00", "iv": "11" })),
                },
            },
        }
    }

    fn content_url(&self, item_id: &str) -> String {
        format!("{}/content/{}", self.content_base.trim_end_matches('/'), item_id)
    }

    async fn licensed(&self, item_id: &str, choice: &FormatChoice) -> Result<LicenseResponse> {
        tokio::time::sleep(self.license_delay).await;

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(item_id)
            .and_then(|queue| queue.pop_front());

        let url = self.content_url(item_id);
        match script {
            None => Ok(self.granted(item_id, &choice.codec, choice.drm, url)),
            Some(LicenseScript::Timeout) => Err(Error::Timeout(format!("license for {}", item_id))),
            Some(LicenseScript::Denied) => Ok(LicenseResponse {
                content_license: ContentLicenseDto {
                    status_code: "Denied".to_string(),
                    message: Some("Not owned".to_string()),
                    license_denial_reasons: vec![DenialReasonDto {
                        message: Some("Ownership check failed".to_string()),
                        rejection_reason: Some("Ownership".to_string()),
                        validation_type: Some("Ownership".to_string()),
                    }],
                    content_metadata: None,
                    license_response: None,
                },
            }),
            Some(LicenseScript::ExpiredUrl) => {
                let mut response = self.granted(item_id, &choice.codec, choice.drm, url);
                if let Some(metadata) = response.content_license.content_metadata.as_mut() {
                    metadata.content_url = Some(ContentUrlDto {
                        offline_url: Some(self.content_url(item_id)),
                        expires_at: Some("2000-01-01T00:00:00Z".to_string()),
                    });
                }
                Ok(response)
            }
            Some(LicenseScript::MalformedUrl) => Ok(self.granted(
                item_id,
                &choice.codec,
                choice.drm,
                "not a url".to_string(),
            )),
            Some(LicenseScript::Grant(codec)) => Ok(self.granted(item_id, &codec, choice.drm, url)),
        }
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn fetch_item_metadata(&self, item_id: &str) -> Result<AcquisitionItem> {
        self.library
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))
    }

    async fn fetch_library_page(&self, page: u32, page_size: u32) -> Result<Vec<AcquisitionItem>> {
        let start = ((page.max(1) - 1) * page_size) as usize;
        Ok(self
            .library
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn fetch_children_page(
        &self,
        parent_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<AcquisitionItem>> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        let start = ((page.max(1) - 1) * page_size) as usize;
        Ok(self
            .children
            .get(parent_id)
            .map(|children| {
                children
                    .iter()
                    .skip(start)
                    .take(page_size as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn request_license(
        &self,
        item_id: &str,
        choice: &FormatChoice,
    ) -> Result<LicenseResponse> {
        self.license_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.licensed(item_id, choice).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_annotations(&self, item_id: &str) -> Result<serde_json::Value> {
        self.annotations
            .clone()
            .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))
    }
}

/// An entitled book with one wrapped encoding.
pub fn wrapped_book(id: &str, title: &str) -> AcquisitionItem {
    let mut item = AcquisitionItem::new(id, ItemKind::Book, title);
    item.encodings = vec![Encoding {
        codec: "LC_128_44100_stereo".to_string(),
        drm: DrmType::Adrm,
        sample_rate: 44_100,
        bitrate: 128,
    }];
    item
}

/// An entitled book with only a legacy encoding.
pub fn legacy_book(id: &str, title: &str) -> AcquisitionItem {
    let mut item = AcquisitionItem::new(id, ItemKind::Book, title);
    item.encodings = vec![Encoding {
        codec: "AAX_44_128".to_string(),
        drm: DrmType::Aax,
        sample_rate: 44_100,
        bitrate: 128,
    }];
    item
}
