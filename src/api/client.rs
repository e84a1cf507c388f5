//! Catalog API HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::catalog::CatalogClient;
use crate::api::types::*;
use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::format::FormatChoice;
use crate::media::{parse_item, AcquisitionItem, CodecFamily};

/// Response groups requested for item listings.
const ITEM_RESPONSE_GROUPS: &str = "contributors, customer_rights, media, price, product_attrs, \
     product_desc, product_extended_attrs, relationships, series, is_ayce, pdf_url";

/// Response groups requested with a license.
const LICENSE_RESPONSE_GROUPS: &str = "last_position_heard, pdf_url, content_reference, chapter_info";

/// Fallback wait when a 429 carries no Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Catalog client over the JSON REST API.
pub struct HttpCatalog {
    client: Client,
    api_base: String,
    token: String,
    marketplace: String,
}

impl HttpCatalog {
    /// Create a new catalog client.
    pub fn new(account: &AccountConfig, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(&account.user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: account.api_base.trim_end_matches('/').to_string(),
            token: account.access_token.clone(),
            marketplace: account.marketplace.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Send an authenticated request and map error statuses.
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .query(&[("marketplace", self.marketplace.as_str())])
            .send()
            .await
            .map_err(|e| Error::from_request(url, e))?;

        let status = response.status();
        tracing::debug!("Response status: {} for {}", status, url);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(Error::RateLimited(retry_after));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Auth error response: {}", body);
            return Err(Error::Authentication(format!(
                "HTTP {}: {}",
                status,
                if body.is_empty() {
                    "Authentication failed"
                } else {
                    &body
                }
            )));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(Error::ItemNotFound(url.to_string()));
        }

        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// Decode a JSON body, keeping a snippet of it in the error.
    async fn json<T: DeserializeOwned>(response: Response, url: &str, what: &str) -> Result<T> {
        let text = response
            .text()
            .await
            .map_err(|e| Error::from_request(url, e))?;
        tracing::debug!("{} response length: {} bytes", what, text.len());

        serde_json::from_str(&text).map_err(|e| {
            Error::Api(format!(
                "Failed to parse {}: {} - Response: {}",
                what,
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let response = self.send(self.client.get(&url).query(query), &url).await?;
        Self::json(response, &url, what).await
    }

    fn parse_items(items: &[ItemDto]) -> Vec<AcquisitionItem> {
        items
            .iter()
            .filter_map(|dto| {
                let item = parse_item(dto);
                if item.is_none() {
                    tracing::warn!("Skipping catalog record without identifier");
                }
                item
            })
            .collect()
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn fetch_item_metadata(&self, item_id: &str) -> Result<AcquisitionItem> {
        let response: ItemResponse = self
            .get_json(
                &format!("library/{}", item_id),
                &[("response_groups", ITEM_RESPONSE_GROUPS.to_string())],
                "item",
            )
            .await?;

        parse_item(&response.item).ok_or_else(|| Error::ItemNotFound(item_id.to_string()))
    }

    async fn fetch_library_page(&self, page: u32, page_size: u32) -> Result<Vec<AcquisitionItem>> {
        let response: ItemsResponse = self
            .get_json(
                "library",
                &[
                    ("page", page.to_string()),
                    ("num_results", page_size.to_string()),
                    ("response_groups", ITEM_RESPONSE_GROUPS.to_string()),
                ],
                "library",
            )
            .await?;

        Ok(Self::parse_items(&response.items))
    }

    async fn fetch_children_page(
        &self,
        parent_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<AcquisitionItem>> {
        let response: ItemsResponse = self
            .get_json(
                "library",
                &[
                    ("parent_asin", parent_id.to_string()),
                    ("page", page.to_string()),
                    ("num_results", page_size.to_string()),
                    ("response_groups", ITEM_RESPONSE_GROUPS.to_string()),
                ],
                "children",
            )
            .await?;

        Ok(Self::parse_items(&response.items))
    }

    async fn request_license(
        &self,
        item_id: &str,
        choice: &FormatChoice,
    ) -> Result<LicenseResponse> {
        let supported_drm_types = match choice.family {
            CodecFamily::Wrapped => vec!["Mpeg".to_string(), "Adrm".to_string()],
            CodecFamily::Legacy => vec!["Aax".to_string()],
        };

        let body = LicenseRequestBody {
            codec: choice.codec.clone(),
            supported_drm_types,
            quality: choice.quality.license_label().to_string(),
            chapter_titles_type: choice.chapter_type.license_label().to_string(),
            consumption_type: "Download".to_string(),
            response_groups: LICENSE_RESPONSE_GROUPS.to_string(),
        };

        let url = self.url(&format!("content/{}/licenserequest", item_id));
        let request_id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        tracing::debug!("POST {} (request id {})", url, request_id);

        let request = self
            .client
            .post(&url)
            .header("X-Amzn-RequestId", request_id)
            .json(&body);
        let response = self.send(request, &url).await?;

        Self::json(response, &url, "license").await
    }

    async fn fetch_annotations(&self, item_id: &str) -> Result<serde_json::Value> {
        self.get_json(
            "annotations/sidecar",
            &[("type", "AUDI".to_string()), ("key", item_id.to_string())],
            "annotations",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account(server: &MockServer) -> AccountConfig {
        AccountConfig {
            api_base: server.uri(),
            access_token: "token".to_string(),
            ..AccountConfig::default()
        }
    }

    fn library_body() -> serde_json::Value {
        serde_json::json!({
            "items": [{
                "asin": "B000000001",
                "title": "Book One",
                "content_delivery_type": "SinglePartBook",
                "customer_rights": { "is_consumable_offline": true },
                "available_codecs": [
                    { "name": "aax_44_128", "enhanced_codec": "LC_128_44100_stereo", "format": "AAX_44_128" }
                ]
            }],
            "total_results": 1
        })
    }

    #[tokio::test]
    async fn test_fetch_library_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/library"))
            .and(query_param("page", "1"))
            .and(query_param("marketplace", "us"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(&account(&server), None).unwrap();
        let items = catalog.fetch_library_page(1, 50).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "B000000001");
        assert!(items[0].entitled);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/library/B000000404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/B000000429"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/B000000401"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(&account(&server), None).unwrap();

        assert!(matches!(
            catalog.fetch_item_metadata("B000000404").await,
            Err(Error::ItemNotFound(_))
        ));
        assert!(matches!(
            catalog.fetch_item_metadata("B000000429").await,
            Err(Error::RateLimited(7))
        ));
        assert!(matches!(
            catalog.fetch_item_metadata("B000000401").await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_request_license_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content/B000000001/licenserequest"))
            .and(body_partial_json(serde_json::json!({
                "codec": "LC_128_44100_stereo",
                "quality": "High",
                "chapter_titles_type": "Tree",
                "consumption_type": "Download"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content_license": {
                    "status_code": "Granted",
                    "content_metadata": {
                        "content_url": { "offline_url": "https://cdn.example/a.aaxc" },
                        "content_reference": { "content_format": "LC_128_44100_stereo", "drm_type": "Adrm" }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = HttpCatalog::new(&account(&server), None).unwrap();
        let choice = FormatChoice::for_tests("LC_128_44100_stereo", crate::media::DrmType::Adrm);
        let response = catalog
            .request_license("B000000001", &choice)
            .await
            .unwrap();

        assert_eq!(response.content_license.status_code, "Granted");
    }
}
