//! Process-wide TTL key/value store.
//!
//! Backs the redirect cache, the fetch admission locks and the external
//! search URL cache. Entries expire lazily on access. Each key's
//! read-then-write tolerates the rare lost-update race, so no cross-entry
//! transaction is needed.

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    expires_at: Instant,
    value: V,
}

pub struct TtlCache<V: Clone> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        // Drop the read guard before removing.
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                expires_at: Instant::now() + ttl,
                value,
            },
        );
    }

    /// Set `key` only if it is absent or expired. Returns whether this call
    /// took the slot. Best-effort lock primitive, not linearizable.
    pub fn test_and_set(&self, key: impl Into<String>, value: V, ttl: Duration) -> bool {
        use dashmap::mapref::entry::Entry as MapEntry;
        let now = Instant::now();
        match self.entries.entry(key.into()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.expires_at > now {
                    return false;
                }
                entry.expires_at = now + ttl;
                entry.value = value;
                true
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    expires_at: now + ttl,
                    value,
                });
                true
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_live_entries_only() {
        let cache = TtlCache::new();
        cache.insert("a", 1u32, Duration::from_secs(60));
        cache.insert("b", 2u32, Duration::from_millis(0));
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_and_set_takes_slot_once() {
        let cache = TtlCache::new();
        assert!(cache.test_and_set("lock", (), Duration::from_secs(60)));
        assert!(!cache.test_and_set("lock", (), Duration::from_secs(60)));
    }

    #[test]
    fn test_and_set_retakes_expired_slot() {
        let cache = TtlCache::new();
        assert!(cache.test_and_set("lock", (), Duration::from_millis(0)));
        assert!(cache.test_and_set("lock", (), Duration::from_secs(60)));
    }
}
