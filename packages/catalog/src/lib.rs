//! Catalog ingestion and resolution core.
//!
//! Ingests external catalog pages (books, movies, music, podcasts) through
//! per-source [`SiteAdapter`]s, normalizes each scrape into a
//! [`ResourceContent`], resolves the resulting [`ExternalResource`] against
//! the canonical [`Item`] catalog, and deduplicates both external sources
//! and search results.
//!
//! Flow: a URL arrives, the [`SiteRegistry`] picks an adapter, the
//! [`Resolver`] gets-or-creates the resource, scrapes if needed, matches or
//! creates an item, persists both, and enqueues background crawling of the
//! resource's related links. Search queries pass through [`CatalogSearch`],
//! which collapses duplicates at query time without touching the index.
//!
//! Storage, per-site extraction rules, the index engine and the HTTP
//! transport stay behind traits ([`CatalogStore`], [`SiteAdapter`],
//! [`CatalogIndex`], [`RedirectResolver`]).

pub mod cache;
pub mod config;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod matching;
pub mod resolver;
pub mod search;
pub mod sites;
pub mod store;
pub mod testing;
pub mod types;

pub use cache::TtlCache;
pub use config::CatalogConfig;
pub use crawl::{CrawlCommand, CrawlTask, RefreshPodcastsCommand, RefreshPodcastsTask};
pub use error::{CatalogError, DownloadError, DownloadErrorKind};
pub use fetch::{
    fetch_job_key, FetchCommand, FetchController, FetchGate, FetchOutcome, FetchPoll, FetchTask,
    NoRemoteSearch, RemoteSearch, FETCH_FAILED,
};
pub use resolver::{ResolveOptions, Resolver};
pub use search::{
    dedup_items, CatalogIndex, CatalogSearch, DedupedItem, IndexPage, SearchQuery, SearchResult,
};
pub use sites::{
    BoundSite, HttpRedirectResolver, RedirectResolver, SiteAdapter, SiteRegistry, UrlPatternSet,
};
pub use store::memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use store::postgres::PostgresStore;
pub use store::{CatalogStore, ItemAction};
pub use types::{
    normalize_languages, CoverImage, ExternalResource, IdType, Item, ItemCategory, ItemType,
    LinkDescriptor, LocalizedText, ResourceContent, IDEAL_ID_TYPES,
};
