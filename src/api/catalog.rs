//! Catalog collaborator interface.

use async_trait::async_trait;

use crate::api::types::LicenseResponse;
use crate::error::Result;
use crate::format::FormatChoice;
use crate::media::AcquisitionItem;

/// Operations the engine needs from the remote catalog/account service.
///
/// Implementations own authentication, request signing and wire formats.
/// They perform a single attempt per call; retries belong to the scheduler.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Look up a single item by id.
    async fn fetch_item_metadata(&self, item_id: &str) -> Result<AcquisitionItem>;

    /// Fetch one page (1-based) of the account library.
    async fn fetch_library_page(&self, page: u32, page_size: u32) -> Result<Vec<AcquisitionItem>>;

    /// Fetch one page (1-based) of the children of a podcast or multi-part book.
    async fn fetch_children_page(
        &self,
        parent_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<AcquisitionItem>>;

    /// Issue a license request for `item_id` in the chosen format.
    async fn request_license(&self, item_id: &str, choice: &FormatChoice)
        -> Result<LicenseResponse>;

    /// Fetch bookmarks, notes and clips for an item.
    async fn fetch_annotations(&self, item_id: &str) -> Result<serde_json::Value>;
}

/// Fetch the whole library, page by page.
pub async fn fetch_library(
    catalog: &dyn CatalogClient,
    page_size: u32,
) -> Result<Vec<AcquisitionItem>> {
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let batch = catalog.fetch_library_page(page, page_size).await?;
        let len = batch.len();
        tracing::debug!(page, len, "Fetched library page");
        items.extend(batch);

        if len < page_size as usize {
            break;
        }
        page += 1;
    }

    Ok(items)
}
