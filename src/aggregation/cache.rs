//! TTL cache for aggregated results.
//!
//! Contract: at-most-stale-by-TTL, not at-most-once-computed. There is no
//! per-key locking or single-flight protection; concurrent callers that miss
//! may recompute the same value in parallel and the last write wins. Stale
//! entries are treated as misses and left in place until overwritten.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CacheEntry<T> {
    value: T,
    captured_at: Instant,
}

/// Keyed cache with one fixed TTL for every entry kind.
pub struct TtlCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Return the cached value if its age is below the TTL, otherwise None.
    /// A stale entry is not removed; it is overwritten by the next `set`.
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.get(key).and_then(|entry| {
            if entry.captured_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Store a value, resetting its capture timestamp.
    pub fn set(&self, key: &str, value: T) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                captured_at: Instant::now(),
            },
        );
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_get_returns_last_set() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 1u32);
        assert_eq!(cache.get("k"), Some(1));
        cache.set("k", 2);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_expired_entry_is_a_miss_but_stays() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.set("k", 7u32);
        std::thread::sleep(Duration::from_millis(25));

        assert_eq!(cache.get("k"), None);
        // The stale entry is not evicted, only shadowed by the next set.
        assert_eq!(cache.len(), 1);

        cache.set("k", 8);
        assert_eq!(cache.get("k"), Some(8));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1u32);
        cache.set("b", 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_distinct_keys_never_collide() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("op:{\"status\":\"active\"}", 1u32);
        cache.set("op:{\"status\":\"completed\"}", 2);
        assert_eq!(cache.get("op:{\"status\":\"active\"}"), Some(1));
        assert_eq!(cache.get("op:{\"status\":\"completed\"}"), Some(2));
    }
}
