//! Hand-rolled mocks and a wiring harness for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catalog_jobs::MemoryJobQueue;
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::error::{CatalogError, DownloadError, DownloadErrorKind};
use crate::resolver::Resolver;
use crate::search::{CatalogIndex, IndexPage, SearchQuery};
use crate::sites::{RedirectResolver, SiteAdapter, SiteRegistry, UrlPatternSet};
use crate::store::memory::MemoryStore;
use crate::types::{ExternalResource, IdType, Item, ItemType, ResourceContent};

/// Scripted site adapter: canned pages by id, optional injected failures,
/// and a scrape call counter.
pub struct MockSite {
    name: &'static str,
    id_type: IdType,
    patterns: UrlPatternSet,
    url_template: &'static str,
    default_type: Option<ItemType>,
    pages: Mutex<HashMap<String, ResourceContent>>,
    failures: Mutex<HashMap<String, DownloadErrorKind>>,
    additional: Mutex<HashMap<String, Value>>,
    scrape_calls: AtomicUsize,
}

impl MockSite {
    pub fn new(
        name: &'static str,
        id_type: IdType,
        pattern: &str,
        url_template: &'static str,
        default_type: Option<ItemType>,
    ) -> Self {
        Self {
            name,
            id_type,
            patterns: UrlPatternSet::new(&[pattern]).expect("valid test pattern"),
            url_template,
            default_type,
            pages: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            additional: Mutex::new(HashMap::new()),
            scrape_calls: AtomicUsize::new(0),
        }
    }

    pub fn books() -> Self {
        Self::new(
            "goodreads",
            IdType::Goodreads,
            r"^https://goodreads\.test/book/show/(\d+)$",
            "https://goodreads.test/book/show/{id}",
            Some(ItemType::Edition),
        )
    }

    pub fn works() -> Self {
        Self::new(
            "goodreads_work",
            IdType::GoodreadsWork,
            r"^https://goodreads\.test/work/show/(\d+)$",
            "https://goodreads.test/work/show/{id}",
            Some(ItemType::Work),
        )
    }

    pub fn movies() -> Self {
        Self::new(
            "imdb",
            IdType::Imdb,
            r"^https://imdb\.test/title/(tt\d+)$",
            "https://imdb.test/title/{id}",
            Some(ItemType::Movie),
        )
    }

    pub fn tv() -> Self {
        Self::new(
            "tmdb_tv",
            IdType::TmdbTv,
            r"^https://tmdb\.test/tv/(\d+)$",
            "https://tmdb.test/tv/{id}",
            Some(ItemType::TvShow),
        )
    }

    pub fn tv_seasons() -> Self {
        Self::new(
            "tmdb_season",
            IdType::TmdbSeason,
            r"^https://tmdb\.test/tv/season/([\d-]+)$",
            "https://tmdb.test/tv/season/{id}",
            Some(ItemType::TvSeason),
        )
    }

    pub fn podcasts() -> Self {
        Self::new(
            "feeds",
            IdType::Rss,
            r"^https://feeds\.test/([a-z0-9-]+)$",
            "https://feeds.test/{id}",
            Some(ItemType::Podcast),
        )
    }

    pub fn with_page(self, id_value: &str, content: ResourceContent) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(id_value.to_string(), content);
        self
    }

    pub fn with_failure(self, id_value: &str, kind: DownloadErrorKind) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(id_value.to_string(), kind);
        self
    }

    /// Make `scrape_additional_data` write `episodes` into the item's
    /// metadata for this id.
    pub fn with_episodes(self, id_value: &str, episodes: Value) -> Self {
        self.additional
            .lock()
            .unwrap()
            .insert(id_value.to_string(), episodes);
        self
    }

    pub fn set_episodes(&self, id_value: &str, episodes: Value) {
        self.additional
            .lock()
            .unwrap()
            .insert(id_value.to_string(), episodes);
    }

    pub fn set_page(&self, id_value: &str, content: ResourceContent) {
        self.pages
            .lock()
            .unwrap()
            .insert(id_value.to_string(), content);
    }

    pub fn scrape_count(&self) -> usize {
        self.scrape_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteAdapter for MockSite {
    fn name(&self) -> &'static str {
        self.name
    }

    fn id_type(&self) -> IdType {
        self.id_type
    }

    fn validate_url(&self, url: &str) -> bool {
        self.patterns.matches(url)
    }

    fn url_to_id(&self, url: &str) -> Option<String> {
        self.patterns.extract_id(url)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        self.url_template.replace("{id}", id_value)
    }

    fn default_item_type(&self) -> Option<ItemType> {
        self.default_type
    }

    async fn scrape(&self, url: &str, id_value: &str) -> Result<ResourceContent, DownloadError> {
        self.scrape_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failures.lock().unwrap().get(id_value) {
            return Err(DownloadError::new(*kind, url, "injected failure"));
        }
        self.pages
            .lock()
            .unwrap()
            .get(id_value)
            .cloned()
            .ok_or_else(|| DownloadError::new(DownloadErrorKind::NotFound, url, "no such page"))
    }

    async fn scrape_additional_data(
        &self,
        resource: &ExternalResource,
        item: &mut Item,
    ) -> Result<bool, DownloadError> {
        let Some(episodes) = self
            .additional
            .lock()
            .unwrap()
            .get(&resource.id_value)
            .cloned()
        else {
            return Ok(false);
        };
        if item.metadata.get("episodes") == Some(&episodes) {
            return Ok(false);
        }
        item.metadata.insert("episodes".to_string(), episodes);
        Ok(true)
    }
}

/// Scripted redirect table with a call counter.
#[derive(Default)]
pub struct MockRedirectResolver {
    redirects: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockRedirectResolver {
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedirectResolver for MockRedirectResolver {
    async fn resolve(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.redirects.get(url).cloned())
    }
}

/// Canned index returning the same item list for every query.
#[derive(Default)]
pub struct MockIndex {
    items: Mutex<Vec<Item>>,
    calls: AtomicUsize,
}

impl MockIndex {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items: Mutex::new(items),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_items(&self, items: Vec<Item>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl CatalogIndex for MockIndex {
    async fn search(&self, _query: &SearchQuery) -> Result<IndexPage, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap().clone();
        Ok(IndexPage {
            total: items.len() as u64,
            pages: 1,
            items,
            facets: HashMap::new(),
        })
    }
}

/// Memory-backed wiring of store, queue, registry and resolver.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub registry: Arc<SiteRegistry>,
    pub resolver: Arc<Resolver>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_sites(Vec::new())
    }

    pub fn with_sites(sites: Vec<Arc<dyn SiteAdapter>>) -> Self {
        let config = CatalogConfig::test();
        let mut registry = SiteRegistry::new(
            Arc::new(MockRedirectResolver::default()),
            config.clone(),
        );
        for site in sites {
            registry.register(site).expect("unique id types in tests");
        }
        let registry = Arc::new(registry);
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let resolver = Arc::new(Resolver::new(
            store.clone(),
            registry.clone(),
            queue.clone(),
            config,
        ));
        Self {
            store,
            queue,
            registry,
            resolver,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal page content with a title.
pub fn page(title: &str) -> ResourceContent {
    ResourceContent::new().with_metadata("title", title)
}
