use std::{borrow::Borrow, hash::Hash, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::observability::metrics;

/// Default lifetime of a resolved identity in the provider caches.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory key/value cache with lazy per-entry expiration.
///
/// Entries are only checked against their deadline when accessed; an entry
/// found expired is removed by the access that discovers it. There is no
/// background sweeper. A TTL of zero disables the cache entirely: `set`
/// becomes a no-op and every `get` misses.
///
/// The map is sharded (`DashMap`), so callers share one instance across
/// tasks without any external locking.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache. `name` labels log fields and metrics.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                metrics::record_cache_operation(self.name, "get", "hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // Only drop the entry if a concurrent `set` has not refreshed it meanwhile.
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
            metrics::record_cache_operation(self.name, "get", "expired");
        } else {
            metrics::record_cache_operation(self.name, "get", "miss");
        }
        None
    }

    pub fn set(&self, key: K, value: V) {
        if !self.is_enabled() {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
        metrics::record_cache_operation(self.name, "set", "success");
    }

    /// Number of stored entries, including expired ones not yet accessed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.set("k".to_string(), 42);

        assert_eq!(cache.get("k"), Some(42));
        assert_eq!(cache.get("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.set("k".to_string(), "v".to_string());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_removed_on_access() {
        let cache = TtlCache::new("test", Duration::from_secs(1));
        cache.set("k".to_string(), 1);
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        // Still physically present until someone looks at it
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_after_expiry_is_unaffected_by_stale_entry() {
        let cache = TtlCache::new("test", Duration::from_secs(10));
        cache.set("k".to_string(), 1);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k"), None);

        cache.set("k".to_string(), 2);
        assert_eq!(cache.get("k"), Some(2));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_deadline() {
        let cache = TtlCache::new("test", Duration::from_secs(10));
        cache.set("k".to_string(), 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k".to_string(), 2);
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = TtlCache::new("test", Duration::ZERO);
        assert!(!cache.is_enabled());

        cache.set("k".to_string(), 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(TtlCache::new("test", DEFAULT_TTL));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..100 {
                    let key = format!("{}:{}", i, j);
                    cache.set(key.clone(), j);
                    assert_eq!(cache.get(&key), Some(j));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 1600);
    }
}
