//! Site adapters and the registry that maps URLs and ids onto them.

pub mod redirect;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::cache::TtlCache;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, DownloadError};
use crate::types::{ExternalResource, IdType, Item, ItemType, ResourceContent};

pub use redirect::{HttpRedirectResolver, RedirectResolver};

/// One external source family: validates its URL shapes, maps URL and id
/// back and forth, and scrapes pages into [`ResourceContent`].
///
/// Field extraction internals are the adapter's business; the resolution
/// core only sees this contract.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Identifier scheme this adapter is keyed by. One adapter per scheme.
    fn id_type(&self) -> IdType;

    fn validate_url(&self, url: &str) -> bool;

    /// Looser second-pass predicate for adapters that can claim URL shapes
    /// outside their strict templates.
    fn validate_url_fallback(&self, _url: &str) -> bool {
        false
    }

    fn url_to_id(&self, url: &str) -> Option<String>;

    fn id_to_url(&self, id_value: &str) -> String;

    /// Subtype this source's pages resolve to when the scrape does not say
    /// otherwise. `None` for sources that rely entirely on the scrape's
    /// type hint.
    fn default_item_type(&self) -> Option<ItemType>;

    async fn scrape(&self, url: &str, id_value: &str) -> Result<ResourceContent, DownloadError>;

    /// Optional secondary pass that never blocks readiness, e.g. pulling
    /// new podcast episodes. Returns whether the item changed.
    async fn scrape_additional_data(
        &self,
        _resource: &ExternalResource,
        _item: &mut Item,
    ) -> Result<bool, DownloadError> {
        Ok(false)
    }
}

/// Ordered URL templates for an adapter, with the id in the first capture
/// group.
pub struct UrlPatternSet {
    patterns: Vec<Regex>,
}

impl UrlPatternSet {
    pub fn new(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }

    pub fn extract_id(&self, url: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|p| p.captures(url))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// An adapter bound to one concrete page: constructed from a URL or an id,
/// the other derived.
#[derive(Clone)]
pub struct BoundSite {
    pub adapter: Arc<dyn SiteAdapter>,
    pub id_value: String,
    pub url: String,
}

impl BoundSite {
    pub fn from_url(adapter: Arc<dyn SiteAdapter>, url: &str) -> Option<Self> {
        let id_value = adapter.url_to_id(url)?;
        // Canonical URL, not the one that happened to match.
        let url = adapter.id_to_url(&id_value);
        Some(Self {
            adapter,
            id_value,
            url,
        })
    }

    pub fn from_id(adapter: Arc<dyn SiteAdapter>, id_value: &str) -> Self {
        let url = adapter.id_to_url(id_value);
        Self {
            adapter,
            id_value: id_value.to_string(),
            url,
        }
    }

    pub fn id_type(&self) -> IdType {
        self.adapter.id_type()
    }
}

fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Lookup from id scheme or URL shape to a registered adapter.
///
/// Constructed once at process start and passed around by `Arc`; matching
/// is first-match-wins in registration order, so registration order is
/// part of the configuration.
pub struct SiteRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
    by_id_type: HashMap<IdType, usize>,
    redirect_resolver: Arc<dyn RedirectResolver>,
    // Cached final URL per source URL; empty string means "no redirect".
    redirects: TtlCache<String>,
    config: CatalogConfig,
}

impl SiteRegistry {
    pub fn new(redirect_resolver: Arc<dyn RedirectResolver>, config: CatalogConfig) -> Self {
        Self {
            adapters: Vec::new(),
            by_id_type: HashMap::new(),
            redirect_resolver,
            redirects: TtlCache::new(),
            config,
        }
    }

    /// Register an adapter. Double-binding an id type is a startup
    /// programming error, never recoverable at runtime.
    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) -> Result<(), CatalogError> {
        let id_type = adapter.id_type();
        if self.by_id_type.contains_key(&id_type) {
            return Err(CatalogError::DuplicateRegistration(id_type));
        }
        self.by_id_type.insert(id_type, self.adapters.len());
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn site_by_id(&self, id_type: IdType, id_value: &str) -> Option<BoundSite> {
        let adapter = self.by_id_type.get(&id_type).map(|i| &self.adapters[*i])?;
        Some(BoundSite::from_id(adapter.clone(), id_value))
    }

    /// Resolve a URL to an adapter, canonicalizing redirects first.
    ///
    /// Strict patterns are tried in registration order, then fallback
    /// predicates; if the redirected form matched nothing the original URL
    /// gets the same two passes.
    pub async fn site_by_url(&self, url: &str, follow_redirect: bool) -> Option<BoundSite> {
        let canonical = if follow_redirect {
            self.redirected_url(url).await
        } else {
            url.to_string()
        };
        if let Some(site) = self.match_url(&canonical) {
            return Some(site);
        }
        if canonical != url {
            return self.match_url(url);
        }
        None
    }

    fn match_url(&self, url: &str) -> Option<BoundSite> {
        for adapter in &self.adapters {
            if adapter.validate_url(url) {
                if let Some(site) = BoundSite::from_url(adapter.clone(), url) {
                    return Some(site);
                }
            }
        }
        for adapter in &self.adapters {
            if adapter.validate_url_fallback(url) {
                if let Some(site) = BoundSite::from_url(adapter.clone(), url) {
                    return Some(site);
                }
            }
        }
        None
    }

    /// Final URL after redirects, cached. Resolution failures and timeouts
    /// degrade to "no redirect" rather than failing the caller.
    pub async fn redirected_url(&self, url: &str) -> String {
        let key = format!("_redir_{}", url_hash(url));
        if let Some(cached) = self.redirects.get(&key) {
            return if cached.is_empty() {
                url.to_string()
            } else {
                cached
            };
        }
        let resolved = self
            .redirect_resolver
            .resolve(url, self.config.head_timeout)
            .await;
        let target = match resolved {
            Ok(Some(target)) => target,
            Ok(None) => String::new(),
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "redirect resolution failed, assuming none");
                String::new()
            }
        };
        self.redirects
            .insert(key, target.clone(), self.config.redirect_ttl);
        if target.is_empty() {
            url.to_string()
        } else {
            target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRedirectResolver, MockSite};

    fn registry_with(
        resolver: Arc<MockRedirectResolver>,
        sites: Vec<MockSite>,
    ) -> SiteRegistry {
        let mut registry = SiteRegistry::new(resolver, CatalogConfig::test());
        for site in sites {
            registry.register(Arc::new(site)).unwrap();
        }
        registry
    }

    #[test]
    fn duplicate_id_type_registration_fails() {
        let mut registry = registry_with(
            Arc::new(MockRedirectResolver::default()),
            vec![MockSite::books()],
        );
        let err = registry.register(Arc::new(MockSite::books())).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateRegistration(IdType::Goodreads)));
    }

    #[tokio::test]
    async fn url_resolution_is_first_match_in_registration_order() {
        let registry = registry_with(
            Arc::new(MockRedirectResolver::default()),
            vec![MockSite::books(), MockSite::movies()],
        );
        let site = registry
            .site_by_url("https://goodreads.test/book/show/11", false)
            .await
            .unwrap();
        assert_eq!(site.id_type(), IdType::Goodreads);
        assert_eq!(site.id_value, "11");
        assert_eq!(site.url, "https://goodreads.test/book/show/11");

        assert!(registry
            .site_by_url("https://nowhere.test/x", false)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn redirects_are_followed_and_cached() {
        let resolver = Arc::new(
            MockRedirectResolver::default()
                .with_redirect("https://short.test/a", "https://goodreads.test/book/show/11"),
        );
        let registry = registry_with(resolver.clone(), vec![MockSite::books()]);

        let site = registry
            .site_by_url("https://short.test/a", true)
            .await
            .unwrap();
        assert_eq!(site.id_value, "11");

        // Second lookup is served from the redirect cache.
        registry.site_by_url("https://short.test/a", true).await.unwrap();
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn no_redirect_result_is_cached_too() {
        let resolver = Arc::new(MockRedirectResolver::default());
        let registry = registry_with(resolver.clone(), vec![MockSite::books()]);
        registry.redirected_url("https://goodreads.test/book/show/3").await;
        registry.redirected_url("https://goodreads.test/book/show/3").await;
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn original_url_is_retried_when_redirect_target_matches_nothing() {
        let resolver = Arc::new(MockRedirectResolver::default().with_redirect(
            "https://goodreads.test/book/show/5",
            "https://interstitial.test/away",
        ));
        let registry = registry_with(resolver, vec![MockSite::books()]);
        let site = registry
            .site_by_url("https://goodreads.test/book/show/5", true)
            .await
            .unwrap();
        assert_eq!(site.id_value, "5");
    }
}
