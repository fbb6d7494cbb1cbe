use std::time::Duration;

/// Tunables for resolution, admission control and caching.
///
/// `test_mode` shortens every admission TTL to one second so tests and
/// local development do not wait out production lock windows.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub test_mode: bool,
    /// Budget for the redirect HEAD request.
    pub head_timeout: Duration,
    pub redirect_ttl: Duration,
    pub fetch_url_ttl: Duration,
    pub fetch_actor_auth_ttl: Duration,
    pub fetch_actor_anon_ttl: Duration,
    pub external_search_cache_ttl: Duration,
    /// Hop bound when following `merged_to_item` chains.
    pub max_merge_depth: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            head_timeout: Duration::from_secs(2),
            redirect_ttl: Duration::from_secs(3600),
            fetch_url_ttl: Duration::from_secs(7200),
            fetch_actor_auth_ttl: Duration::from_secs(3),
            fetch_actor_anon_ttl: Duration::from_secs(15),
            external_search_cache_ttl: Duration::from_secs(300),
            max_merge_depth: 5,
        }
    }
}

impl CatalogConfig {
    pub fn test() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    pub fn actor_lock_ttl(&self, authenticated: bool) -> Duration {
        if self.test_mode {
            Duration::from_secs(1)
        } else if authenticated {
            self.fetch_actor_auth_ttl
        } else {
            self.fetch_actor_anon_ttl
        }
    }

    pub fn url_lock_ttl(&self) -> Duration {
        if self.test_mode {
            Duration::from_secs(1)
        } else {
            self.fetch_url_ttl
        }
    }
}
