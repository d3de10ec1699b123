//! Bounded LRU cache for deserialized upstream responses.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::types::{SearchTarget, Subject};
use crate::metrics::CACHE_LOOKUPS;

/// Default number of entries kept per cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 20;

/// A least-recently-used cache keyed by a request fingerprint.
///
/// Both [`put`](Self::put) and a successful [`try_get`](Self::try_get)
/// refresh recency. All access goes through one lock, which is never held
/// across I/O.
pub struct ResponseCache<V> {
    name: &'static str,
    capacity: NonZeroUsize,
    entries: Mutex<LruCache<String, V>>,
}

impl<V: Clone> ResponseCache<V> {
    /// Create a cache. A capacity of zero is treated as one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            capacity,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Insert or replace `key`, making it the most recently used entry.
    /// Evicts the least recently used entry when full.
    pub async fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(key.clone(), value) {
            if evicted != key {
                debug!(cache = self.name, key = %evicted, "Evicted cache entry");
            }
        }
    }

    /// Look up `key`, promoting it on a hit.
    pub async fn try_get(&self, key: &str) -> Option<V> {
        let hit = self.entries.lock().await.get(key).cloned();
        let result = if hit.is_some() { "hit" } else { "miss" };
        CACHE_LOOKUPS.with_label_values(&[self.name, result]).inc();
        hit
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

/// The search and subject caches a client keeps.
pub struct ClientCaches {
    pub search: ResponseCache<Vec<SearchTarget>>,
    pub subject: ResponseCache<Subject>,
}

impl ClientCaches {
    pub fn new(capacity: usize) -> Self {
        Self {
            search: ResponseCache::new("search", capacity),
            subject: ResponseCache::new("subject", capacity),
        }
    }

    /// Fingerprint for a name search.
    pub fn search_key(name: &str, kind: super::MediaKind) -> String {
        format!("{}-{}", name, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::MediaKind;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_evicts_least_recently_inserted() {
        let cache = ResponseCache::new("test", 2);
        cache.put("1", 1).await;
        cache.put("2", 2).await;
        cache.put("3", 3).await;

        assert_eq!(cache.try_get("1").await, None);
        assert_eq!(cache.try_get("2").await, Some(2));
        assert_eq!(cache.try_get("3").await, Some(3));
    }

    #[tokio::test]
    async fn test_access_refreshes_recency() {
        let cache = ResponseCache::new("test", 2);
        cache.put("1", 1).await;
        cache.put("2", 2).await;
        cache.put("3", 3).await;

        // Touch "2" so "3" becomes the eviction candidate.
        assert_eq!(cache.try_get("2").await, Some(2));
        cache.put("4", 4).await;

        assert_eq!(cache.try_get("3").await, None);
        assert_eq!(cache.try_get("2").await, Some(2));
        assert_eq!(cache.try_get("4").await, Some(4));
    }

    #[tokio::test]
    async fn test_reinsert_replaces_and_promotes() {
        let cache = ResponseCache::new("test", 2);
        cache.put("a", "old").await;
        cache.put("b", "b").await;
        cache.put("a", "new").await;
        cache.put("c", "c").await;

        assert_eq!(cache.try_get("a").await, Some("new"));
        assert_eq!(cache.try_get("b").await, None);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_miss_has_no_side_effect() {
        let cache = ResponseCache::new("test", 2);
        cache.put("1", 1).await;
        cache.put("2", 2).await;

        assert_eq!(cache.try_get("missing").await, None);
        cache.put("3", 3).await;

        // "1" is still the least recently used.
        assert_eq!(cache.try_get("1").await, None);
        assert_eq!(cache.try_get("2").await, Some(2));
    }

    #[tokio::test]
    async fn test_keeps_exactly_capacity_most_recent() {
        for capacity in [1usize, 3, 20] {
            let cache = ResponseCache::new("test", capacity);
            for i in 0..=capacity {
                cache.put(i.to_string(), i).await;
            }
            assert_eq!(cache.len().await, capacity);
            assert_eq!(cache.try_get("0").await, None);
            for i in 1..=capacity {
                assert_eq!(cache.try_get(&i.to_string()).await, Some(i));
            }
        }
    }

    #[tokio::test]
    async fn test_single_slot_cache() {
        let cache = ResponseCache::new("test", 1);
        cache.put("x", 1).await;
        cache.put("y", 2).await;
        assert_eq!(cache.try_get("x").await, None);
        assert_eq!(cache.try_get("y").await, Some(2));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_single_slot() {
        let cache: ResponseCache<u8> = ResponseCache::new("test", 0);
        assert_eq!(cache.capacity(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts() {
        let cache = Arc::new(ResponseCache::new("test", 50));
        let handles: Vec<_> = (0..50)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.put(format!("k{}", i), i).await })
            })
            .collect();
        futures::future::join_all(handles).await;

        assert_eq!(cache.len().await, 50);
        assert_eq!(cache.try_get("k17").await, Some(17));
    }

    #[test]
    fn test_search_key_format() {
        assert_eq!(ClientCaches::search_key("千与千寻", MediaKind::Movie), "千与千寻-movie");
        assert_eq!(ClientCaches::search_key("Friends", MediaKind::Tv), "Friends-tv");
    }
}
