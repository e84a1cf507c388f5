//! Library listing and work selection.

use std::path::Path;

use futures::future::try_join_all;
use serde::Deserialize;

use crate::api::{fetch_library, CatalogClient, ItemDto, ItemsResponse};
use crate::download::expand::PodcastExpander;
use crate::error::{Error, Result};
use crate::media::{parse_item, AcquisitionItem, ItemKind};

/// Minimum title accuracy (percent) for a partial match.
pub const TITLE_MATCH_THRESHOLD: f64 = 80.0;

/// What to pick from the library.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub all: bool,
    pub ids: Vec<String>,
    pub titles: Vec<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        !self.all && self.ids.is_empty() && self.titles.is_empty()
    }
}

/// Accepted `--items-file` layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsFile {
    List(Vec<ItemDto>),
    Listing(ItemsResponse),
}

/// The account library, or a list of items supplied from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Library {
    items: Vec<AcquisitionItem>,
}

impl Library {
    pub fn new(items: Vec<AcquisitionItem>) -> Self {
        Self { items }
    }

    /// List the whole library from the catalog.
    pub async fn fetch(catalog: &dyn CatalogClient, page_size: u32) -> Result<Self> {
        let items = fetch_library(catalog, page_size).await?;
        tracing::info!("Library contains {} item(s)", items.len());
        Ok(Self::new(items))
    }

    /// Load catalog items from a JSON file.
    ///
    /// Accepts a bare array of items or a listing object with an `items` key.
    pub fn from_items_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::from_io(path, e))?;
        let dtos = match serde_json::from_str(&content)? {
            ItemsFile::List(items) => items,
            ItemsFile::Listing(listing) => listing.items,
        };

        let items: Vec<AcquisitionItem> = dtos.iter().filter_map(parse_item).collect();
        if items.len() < dtos.len() {
            tracing::warn!(
                "Ignored {} record(s) without an id in {}",
                dtos.len() - items.len(),
                path.display()
            );
        }

        Ok(Self::new(items))
    }

    pub fn items(&self) -> &[AcquisitionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AcquisitionItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Add the episodes of every podcast so they can be selected on their own.
    pub async fn resolve_podcasts(&mut self, expander: &PodcastExpander) -> Result<()> {
        let parents: Vec<AcquisitionItem> = self
            .items
            .iter()
            .filter(|item| item.kind == ItemKind::PodcastParent)
            .cloned()
            .collect();

        let expanded =
            try_join_all(parents.into_iter().map(|parent| expander.collect(parent, None))).await?;

        let added: usize = expanded.iter().map(Vec::len).sum();
        for children in expanded {
            self.items.extend(children);
        }
        tracing::info!("Resolved {} podcast episode(s)", added);
        Ok(())
    }

    /// Items whose full title matches `title` with at least `threshold` accuracy.
    pub fn search_title(&self, title: &str, threshold: f64) -> Vec<(&AcquisitionItem, f64)> {
        self.items
            .iter()
            .map(|item| (item, title_accuracy(title, &item.full_title())))
            .filter(|(_, accuracy)| *accuracy >= threshold)
            .collect()
    }

    /// Resolve a selection into work items, in selection order.
    ///
    /// Unknown ids fail unless `ignore_errors` is set. A title with exact
    /// matches selects only those; otherwise all partial matches are taken.
    pub fn select(&self, selection: &Selection, ignore_errors: bool) -> Result<Vec<AcquisitionItem>> {
        if selection.all {
            return Ok(self.items.clone());
        }

        let mut selected = Vec::new();

        for id in &selection.ids {
            match self.get(id) {
                Some(item) => selected.push(item.clone()),
                None if ignore_errors => {
                    tracing::error!("Skip asin {}: Not found in library", id);
                }
                None => return Err(Error::ItemNotFound(id.clone())),
            }
        }

        for title in &selection.titles {
            let matches = self.search_title(title, TITLE_MATCH_THRESHOLD);
            if matches.is_empty() {
                tracing::error!("Skip title {}: Not found in library", title);
                continue;
            }

            let exact: Vec<_> = matches
                .iter()
                .filter(|(_, accuracy)| *accuracy >= 100.0)
                .collect();
            let chosen: Vec<&AcquisitionItem> = if exact.is_empty() {
                matches.iter().map(|(item, _)| *item).collect()
            } else {
                exact.into_iter().map(|(item, _)| *item).collect()
            };

            for item in chosen {
                tracing::info!("Selected {} # {}", item.id, item.full_title());
                selected.push(item.clone());
            }
        }

        Ok(selected)
    }
}

/// Share of `search` (percent, two decimals) covered by its longest common
/// substring with `title`, ignoring case.
pub fn title_accuracy(search: &str, title: &str) -> f64 {
    let search: Vec<char> = search.to_lowercase().chars().collect();
    let title: Vec<char> = title.to_lowercase().chars().collect();
    if search.is_empty() {
        return 0.0;
    }

    let mut longest = 0usize;
    let mut previous = vec![0usize; title.len() + 1];
    let mut current = vec![0usize; title.len() + 1];

    for a in &search {
        for (j, b) in title.iter().enumerate() {
            current[j + 1] = if a == b { previous[j] + 1 } else { 0 };
            longest = longest.max(current[j + 1]);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    let percentage = longest as f64 / search.len() as f64 * 100.0;
    (percentage * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{wrapped_book, FakeCatalog};
    use std::sync::Arc;

    fn library() -> Library {
        Library::new(vec![
            wrapped_book("B000000001", "The Hobbit"),
            wrapped_book("B000000002", "The Hobbit Companion"),
            wrapped_book("B000000003", "Dune"),
        ])
    }

    #[test]
    fn test_title_accuracy() {
        assert_eq!(title_accuracy("hobbit", "The Hobbit"), 100.0);
        assert_eq!(title_accuracy("Hobbix", "The Hobbit"), 83.33);
        assert_eq!(title_accuracy("zzz", "The Hobbit"), 0.0);
        assert_eq!(title_accuracy("", "The Hobbit"), 0.0);
    }

    #[test]
    fn test_exact_title_matches_win() {
        let selected = library()
            .select(
                &Selection {
                    titles: vec!["hobbit companion".into()],
                    ..Selection::default()
                },
                false,
            )
            .unwrap();
        let ids: Vec<_> = selected.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["B000000002"]);
    }

    #[test]
    fn test_partial_title_matches() {
        let lib = library();
        let matches = lib.search_title("Hobbit Companions", TITLE_MATCH_THRESHOLD);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0.id, "B000000002");
    }

    #[test]
    fn test_unknown_id() {
        let selection = Selection {
            ids: vec!["B000000009".into(), "B000000003".into()],
            ..Selection::default()
        };

        let err = library().select(&selection, false).unwrap_err();
        assert!(matches!(err, Error::ItemNotFound(_)));

        let selected = library().select(&selection, true).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "B000000003");
    }

    #[test]
    fn test_select_all() {
        let selected = library()
            .select(
                &Selection {
                    all: true,
                    ..Selection::default()
                },
                false,
            )
            .unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_items_file_layouts() {
        let dir = tempfile::tempdir().unwrap();

        let list = dir.path().join("list.json");
        std::fs::write(&list, r#"[{"asin": "B000000001", "title": "Dune"}, {"asin": ""}]"#).unwrap();
        let lib = Library::from_items_file(&list).unwrap();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get("B000000001").map(|i| i.title.as_str()), Some("Dune"));

        let listing = dir.path().join("listing.json");
        std::fs::write(&listing, r#"{"items": [{"asin": "B000000002"}]}"#).unwrap();
        assert_eq!(Library::from_items_file(&listing).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_podcasts() {
        let show = AcquisitionItem::new("P000000001", ItemKind::PodcastParent, "Radio Show");
        let mut catalog = FakeCatalog::new("https://cdn.example");
        catalog.children.insert(
            show.id.clone(),
            vec![
                wrapped_book("E000000001", "Pilot"),
                wrapped_book("E000000002", "Finale"),
            ],
        );
        let expander = PodcastExpander::new(Arc::new(catalog), 50);

        let mut lib = Library::new(vec![show, wrapped_book("B000000003", "Dune")]);
        lib.resolve_podcasts(&expander).await.unwrap();

        assert_eq!(lib.len(), 4);
        let pilot = lib.get("E000000001").unwrap();
        assert_eq!(pilot.full_title(), "Radio Show: Pilot");
    }
}
