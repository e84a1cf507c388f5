//! Expansion of podcasts and multi-part books into their children.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::api::CatalogClient;
use crate::error::{Error, Result};
use crate::media::AcquisitionItem;

/// Turns parent items into the sequence of their children.
///
/// Children are paged from the catalog lazily; dropping the stream stops
/// fetching. Calling [`PodcastExpander::expand`] again starts over from the
/// first page.
#[derive(Clone)]
pub struct PodcastExpander {
    catalog: Arc<dyn CatalogClient>,
    page_size: u32,
}

impl PodcastExpander {
    pub fn new(catalog: Arc<dyn CatalogClient>, page_size: u32) -> Self {
        Self {
            catalog,
            page_size: page_size.max(1),
        }
    }

    /// Expand `item`; anything that is not a parent yields itself.
    ///
    /// `filter` keeps only children whose id matches exactly or whose title
    /// contains it (case-insensitive).
    pub fn expand(
        &self,
        item: AcquisitionItem,
        filter: Option<&str>,
    ) -> BoxStream<'static, Result<AcquisitionItem>> {
        if !item.kind.is_parent() {
            return stream::once(future::ready(Ok(item))).boxed();
        }

        let catalog = self.catalog.clone();
        let page_size = self.page_size;
        let parent = Arc::new(item);
        let filter = filter.map(str::to_lowercase);

        let pages_parent = parent.clone();
        stream::try_unfold(Some(1u32), move |page| {
            fetch_page(catalog.clone(), pages_parent.clone(), page, page_size)
        })
        .map_ok(|children| stream::iter(children.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .map_ok(move |child| parent.child(child))
        .try_filter(move |child| future::ready(matches_filter(child, filter.as_deref())))
        .boxed()
    }

    /// Expand `item` and collect all children.
    pub async fn collect(
        &self,
        item: AcquisitionItem,
        filter: Option<&str>,
    ) -> Result<Vec<AcquisitionItem>> {
        self.expand(item, filter).try_collect().await
    }
}

/// Fetch one page of children and compute the page after it.
async fn fetch_page(
    catalog: Arc<dyn CatalogClient>,
    parent: Arc<AcquisitionItem>,
    page: Option<u32>,
    page_size: u32,
) -> Result<Option<(Vec<AcquisitionItem>, Option<u32>)>> {
    let Some(page) = page else {
        return Ok(None);
    };

    let children = catalog
        .fetch_children_page(&parent.id, page, page_size)
        .await?;
    tracing::debug!(
        item = %parent.id,
        page,
        len = children.len(),
        "Fetched children page"
    );

    let next = (children.len() >= page_size as usize).then_some(page + 1);
    Ok(Some((children, next)))
}

fn matches_filter(item: &AcquisitionItem, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => {
            item.id.to_lowercase() == filter || item.full_title().to_lowercase().contains(filter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ItemKind;
    use crate::test_support::{wrapped_book, FakeCatalog};

    fn show_with_episodes(count: usize) -> (AcquisitionItem, FakeCatalog) {
        let show = AcquisitionItem::new("P000000001", ItemKind::PodcastParent, "Night Vale");
        let mut catalog = FakeCatalog::new("https://cdn.example");
        let episodes = (0..count)
            .map(|i| {
                let mut ep = wrapped_book(&format!("E00000000{}", i), &format!("Episode {}", i));
                ep.kind = ItemKind::PodcastEpisode;
                ep
            })
            .collect();
        catalog.children.insert(show.id.clone(), episodes);
        (show, catalog)
    }

    #[tokio::test]
    async fn test_identity_for_books() {
        let catalog = Arc::new(FakeCatalog::new("https://cdn.example"));
        let expander = PodcastExpander::new(catalog.clone(), 10);

        let items = expander
            .collect(wrapped_book("B000000001", "Dune"), None)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "B000000001");
        assert_eq!(catalog.children_calls(), 0);
    }

    #[tokio::test]
    async fn test_pages_through_children() {
        let (show, catalog) = show_with_episodes(5);
        let catalog = Arc::new(catalog);
        let expander = PodcastExpander::new(catalog.clone(), 2);

        let items = expander.collect(show, None).await.unwrap();

        assert_eq!(items.len(), 5);
        assert!(items
            .iter()
            .all(|ep| ep.parent.as_ref().map(|p| p.id.as_str()) == Some("P000000001")));
        // 2 + 2 + 1, the short page ends the sequence
        assert_eq!(catalog.children_calls(), 3);
    }

    #[tokio::test]
    async fn test_lazy_and_restartable() {
        let (show, catalog) = show_with_episodes(6);
        let catalog = Arc::new(catalog);
        let expander = PodcastExpander::new(catalog.clone(), 2);

        let first: Vec<_> = expander
            .expand(show.clone(), None)
            .take(1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(catalog.children_calls(), 1);

        let all = expander.collect(show, None).await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_filter_single_episode() {
        let (show, catalog) = show_with_episodes(4);
        let expander = PodcastExpander::new(Arc::new(catalog), 10);

        let by_title = expander.collect(show.clone(), Some("episode 2")).await.unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].id, "E000000002");

        let by_id = expander.collect(show, Some("E000000003")).await.unwrap();
        assert_eq!(by_id.len(), 1);
    }
}
