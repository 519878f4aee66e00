//! Tier 1 of the two-tier idempotency check (§4.2, §9): a bounded,
//! thread-safe, process-local LRU cache. Correctness rests on the durable
//! registry (tier 2); this cache is purely an optimization to avoid the
//! registry round-trip on hot redelivery.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

/// Default bound on the number of idempotency keys held in memory.
pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct IdempotencyCache {
    inner: Mutex<LruCache<String, Uuid>>,
}

impl IdempotencyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn contains(&self, idempotency_key: &str) -> bool {
        self.inner.lock().unwrap().contains(idempotency_key)
    }

    pub fn insert(&self, idempotency_key: &str, event_id: Uuid) {
        self.inner.lock().unwrap().put(idempotency_key.to_string(), event_id);
    }

    /// Test/ops hook: clear the in-memory tier, forcing every subsequent
    /// check to fall through to the durable registry (§8 scenario 7).
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let cache = IdempotencyCache::new(10);
        assert!(!cache.contains("k"));
        cache.insert("k", Uuid::new_v4());
        assert!(cache.contains("k"));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = IdempotencyCache::new(10);
        cache.insert("k", Uuid::new_v4());
        cache.clear();
        assert!(!cache.contains("k"));
    }

    #[test]
    fn bounded_capacity_evicts_oldest() {
        let cache = IdempotencyCache::new(2);
        cache.insert("a", Uuid::new_v4());
        cache.insert("b", Uuid::new_v4());
        cache.insert("c", Uuid::new_v4());
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }
}
