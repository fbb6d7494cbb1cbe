//! Query-time search result deduplication.
//!
//! The index is never mutated; duplicates are only collapsed in the result
//! view returned to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::store::CatalogStore;
use crate::types::{IdType, Item, ItemCategory, ItemType};

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    pub categories: Vec<ItemCategory>,
    pub exclude_categories: Vec<ItemCategory>,
    pub page: u32,
    pub page_size: u32,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, page: u32) -> Self {
        Self {
            keyword: keyword.into(),
            categories: Vec::new(),
            exclude_categories: Vec::new(),
            page,
            page_size: 20,
        }
    }

    pub fn with_categories(mut self, categories: Vec<ItemCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn normalized_keyword(&self) -> String {
        self.keyword.trim().to_string()
    }

    /// Out-of-range input yields an empty result set, not an error, and
    /// must never reach the index.
    pub fn is_valid(&self) -> bool {
        let len = self.normalized_keyword().chars().count();
        (1..=99).contains(&self.page) && (2..=100).contains(&len)
    }
}

/// One page of raw index output.
#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    pub items: Vec<Item>,
    pub total: u64,
    pub pages: u32,
    pub facets: HashMap<ItemCategory, u64>,
}

/// The full-text index, internals out of scope.
#[async_trait]
pub trait CatalogIndex: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<IndexPage, CatalogError>;
}

/// A result item plus the later results collapsed into it.
#[derive(Debug, Clone)]
pub struct DedupedItem {
    pub item: Item,
    pub duplicates: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub items: Vec<DedupedItem>,
    pub total: u64,
    pub pages: u32,
    pub facets: HashMap<ItemCategory, u64>,
    pub keyword: String,
}

impl SearchResult {
    pub fn empty(keyword: String) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            pages: 0,
            facets: HashMap::new(),
            keyword,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Id(IdType, String),
    Work(Uuid),
}

// External identifier plus work grouping; barcode (gtin) counts as an
// external identifier alongside isbn and imdb.
fn dedup_keys(item: &Item) -> Vec<DedupKey> {
    let mut keys = Vec::new();
    if let Some((id_type, id_value)) = &item.primary_lookup_id {
        if matches!(id_type, IdType::Isbn | IdType::Imdb | IdType::Gtin) {
            keys.push(DedupKey::Id(*id_type, id_value.clone()));
        }
    }
    if let Some(work) = item.work_item {
        keys.push(DedupKey::Work(work));
    }
    keys
}

/// Collapse duplicates in an ordered result sequence.
///
/// First pass: the first item claiming a dedup key wins; later items
/// sharing any claimed key are appended to the claimant's duplicate list.
/// Second pass: a season whose show is also in the result set is demoted
/// to a duplicate of the show.
pub fn dedup_items(items: Vec<Item>) -> Vec<DedupedItem> {
    let mut claimed: HashMap<DedupKey, usize> = HashMap::new();
    let mut emitted: Vec<DedupedItem> = Vec::new();
    for item in items {
        let keys = dedup_keys(&item);
        if let Some(&winner) = keys.iter().find_map(|k| claimed.get(k)) {
            // The duplicate's remaining keys transfer to the winner, so a
            // later item sharing only those still collapses.
            for key in keys {
                claimed.entry(key).or_insert(winner);
            }
            emitted[winner].duplicates.push(item);
            continue;
        }
        let index = emitted.len();
        for key in keys {
            claimed.entry(key).or_insert(index);
        }
        emitted.push(DedupedItem {
            item,
            duplicates: Vec::new(),
        });
    }

    let shows: Vec<Uuid> = emitted
        .iter()
        .filter(|e| e.item.item_type == ItemType::TvShow)
        .map(|e| e.item.uuid)
        .collect();
    let mut kept: Vec<DedupedItem> = Vec::with_capacity(emitted.len());
    let mut folded: Vec<(Uuid, Vec<Item>)> = Vec::new();
    for entry in emitted {
        let parent = entry.item.parent_item;
        if entry.item.item_type == ItemType::TvSeason
            && parent.is_some_and(|p| shows.contains(&p))
        {
            let mut items = vec![entry.item];
            items.extend(entry.duplicates);
            folded.push((parent.unwrap(), items));
            continue;
        }
        kept.push(entry);
    }
    for (show, items) in folded {
        if let Some(entry) = kept.iter_mut().find(|e| e.item.uuid == show) {
            entry.duplicates.extend(items);
        }
    }
    kept
}

/// Search front end: validates input, queries the index, dedups the
/// results, and remembers which external resource URLs contributed.
pub struct CatalogSearch {
    index: Arc<dyn CatalogIndex>,
    store: Arc<dyn CatalogStore>,
    url_cache: TtlCache<Vec<String>>,
    config: CatalogConfig,
}

impl CatalogSearch {
    pub fn new(
        index: Arc<dyn CatalogIndex>,
        store: Arc<dyn CatalogStore>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            index,
            store,
            url_cache: TtlCache::new(),
            config,
        }
    }

    pub async fn query_index(&self, query: &SearchQuery) -> Result<SearchResult, CatalogError> {
        let keyword = query.normalized_keyword();
        if !query.is_valid() {
            tracing::debug!(keyword = %keyword, page = query.page, "invalid search input");
            return Ok(SearchResult::empty(keyword));
        }
        let page = self.index.search(query).await?;
        let items = dedup_items(page.items);

        // Union with what a recent identical query already recorded.
        let cache_key = Self::cache_key(&query.categories, &keyword);
        let mut urls = self.url_cache.get(&cache_key).unwrap_or_default();
        for entry in &items {
            for resource in self.store.resources_for_item(entry.item.uuid).await? {
                if !urls.contains(&resource.url) {
                    urls.push(resource.url);
                }
            }
        }
        self.url_cache
            .insert(cache_key, urls, self.config.external_search_cache_ttl);

        Ok(SearchResult {
            items,
            total: page.total,
            pages: page.pages,
            facets: page.facets,
            keyword,
        })
    }

    /// External resource URLs that backed a recent identical query, used to
    /// avoid duplicating external searches. `None` once the entry expires.
    pub fn recent_external_urls(
        &self,
        categories: &[ItemCategory],
        keyword: &str,
    ) -> Option<Vec<String>> {
        self.url_cache.get(&Self::cache_key(categories, keyword))
    }

    fn cache_key(categories: &[ItemCategory], keyword: &str) -> String {
        let categories: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
        format!("search_urls_{}_{}", categories.join(","), keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::testing::MockIndex;
    use crate::types::LocalizedText;

    fn item_with_primary(item_type: ItemType, id_type: IdType, id_value: &str) -> Item {
        let mut item = Item::new(item_type);
        item.localized_title.push(LocalizedText::new("en", id_value));
        item.primary_lookup_id = Some((id_type, id_value.to_string()));
        item
    }

    #[test]
    fn shared_isbn_collapses_into_first_claimant() {
        let first = item_with_primary(ItemType::Edition, IdType::Isbn, "9780441013593");
        let second = item_with_primary(ItemType::Edition, IdType::Isbn, "9780441013593");
        let other = item_with_primary(ItemType::Edition, IdType::Isbn, "9780451524935");

        let deduped = dedup_items(vec![first.clone(), second.clone(), other.clone()]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].item.uuid, first.uuid);
        assert_eq!(deduped[0].duplicates.len(), 1);
        assert_eq!(deduped[0].duplicates[0].uuid, second.uuid);
        assert!(deduped[1].duplicates.is_empty());
    }

    #[test]
    fn duplicate_keys_transfer_to_the_winner() {
        // first shares an isbn with second; third shares only second's work.
        let work = Uuid::new_v4();
        let first = item_with_primary(ItemType::Edition, IdType::Isbn, "9780441013593");
        let mut second = item_with_primary(ItemType::Edition, IdType::Isbn, "9780441013593");
        second.work_item = Some(work);
        let mut third = item_with_primary(ItemType::Edition, IdType::Isbn, "9780000000002");
        third.work_item = Some(work);

        let deduped = dedup_items(vec![first.clone(), second, third]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].item.uuid, first.uuid);
        assert_eq!(deduped[0].duplicates.len(), 2);
    }

    #[test]
    fn work_grouping_collapses_editions() {
        let work = Uuid::new_v4();
        let mut first = item_with_primary(ItemType::Edition, IdType::Isbn, "1111111111111");
        first.work_item = Some(work);
        let mut second = item_with_primary(ItemType::Edition, IdType::Isbn, "2222222222222");
        second.work_item = Some(work);

        let deduped = dedup_items(vec![first.clone(), second.clone()]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].duplicates[0].uuid, second.uuid);
    }

    #[test]
    fn season_is_demoted_when_its_show_is_present() {
        let mut show = item_with_primary(ItemType::TvShow, IdType::Imdb, "tt0903747");
        show.localized_title[0].text = "Breaking Bad".to_string();
        let mut season = item_with_primary(ItemType::TvSeason, IdType::TmdbSeason, "3572-1");
        season.parent_item = Some(show.uuid);

        // Season sorts ahead of the show in raw index order.
        let deduped = dedup_items(vec![season.clone(), show.clone()]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].item.uuid, show.uuid);
        assert_eq!(deduped[0].duplicates[0].uuid, season.uuid);
    }

    #[test]
    fn orphan_season_stays_a_result() {
        let mut season = item_with_primary(ItemType::TvSeason, IdType::TmdbSeason, "3572-1");
        season.parent_item = Some(Uuid::new_v4());
        let deduped = dedup_items(vec![season.clone()]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].item.uuid, season.uuid);
    }

    #[tokio::test]
    async fn out_of_range_page_never_reaches_the_index() {
        let index = Arc::new(MockIndex::default());
        let search = CatalogSearch::new(
            index.clone(),
            Arc::new(MemoryStore::new()),
            CatalogConfig::test(),
        );

        let result = search
            .query_index(&SearchQuery::new("dune", 100))
            .await
            .unwrap();
        assert!(result.items.is_empty());
        assert_eq!(index.calls(), 0);

        let result = search.query_index(&SearchQuery::new("x", 1)).await.unwrap();
        assert!(result.items.is_empty());
        assert_eq!(index.calls(), 0);

        search.query_index(&SearchQuery::new("dune", 1)).await.unwrap();
        assert_eq!(index.calls(), 1);
    }

    #[tokio::test]
    async fn contributing_urls_are_cached_per_query() {
        let store = Arc::new(MemoryStore::new());
        let item = item_with_primary(ItemType::Edition, IdType::Isbn, "9780441013593");
        let mut resource = crate::types::ExternalResource::new(
            IdType::Goodreads,
            "1",
            "https://goodreads.test/book/show/1",
        );
        resource.item = Some(item.uuid);
        store.save_resource(&resource).await.unwrap();

        let index = Arc::new(MockIndex::with_items(vec![item]));
        let search = CatalogSearch::new(index.clone(), store.clone(), CatalogConfig::test());
        search.query_index(&SearchQuery::new("dune", 1)).await.unwrap();

        let urls = search.recent_external_urls(&[], "dune").unwrap();
        assert_eq!(urls, vec!["https://goodreads.test/book/show/1".to_string()]);
        assert!(search.recent_external_urls(&[], "other").is_none());

        // Re-running the query unions new contributors with the cached set.
        let other = item_with_primary(ItemType::Edition, IdType::Isbn, "9780451524935");
        let mut other_resource = crate::types::ExternalResource::new(
            IdType::Goodreads,
            "2",
            "https://goodreads.test/book/show/2",
        );
        other_resource.item = Some(other.uuid);
        store.save_resource(&other_resource).await.unwrap();
        index.set_items(vec![other]);

        search.query_index(&SearchQuery::new("dune", 1)).await.unwrap();
        let urls = search.recent_external_urls(&[], "dune").unwrap();
        assert_eq!(
            urls,
            vec![
                "https://goodreads.test/book/show/1".to_string(),
                "https://goodreads.test/book/show/2".to_string(),
            ]
        );
    }
}
