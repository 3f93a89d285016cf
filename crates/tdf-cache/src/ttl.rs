//! Time-to-live cache.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

/// Default entry lifetime (one hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default number of entries kept by [`TtlCache::new`].
pub const DEFAULT_TTL_CAPACITY: usize = 1024;

/// Thread-safe map whose entries expire `ttl` after insertion.
///
/// Expired entries are replaced on the next lookup; an entry is never
/// updated in place. At most `capacity` entries are kept; inserting past
/// that evicts the least recently used one.
pub struct TtlCache<K, V> {
    entries: Mutex<LruCache<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_TTL_CAPACITY)
    }

    /// Cache keeping at most `capacity` entries (at least one).
    #[must_use]
    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, inserted: Instant) -> bool {
        inserted.elapsed() < self.ttl
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        entries
            .get(key)
            .filter(|(_, inserted)| self.is_fresh(*inserted))
            .map(|(value, _)| value.clone())
    }

    /// Return the fresh value for `key`, or insert the result of `make`.
    ///
    /// The second element is `true` when the value came from the cache.
    pub fn get_or_insert_with(&self, key: &K, make: impl FnOnce() -> V) -> (V, bool) {
        let mut entries = self.lock();
        if let Some((value, inserted)) = entries.get(key)
            && self.is_fresh(*inserted)
        {
            return (value.clone(), true);
        }
        let value = make();
        entries.put(key.clone(), (value.clone(), Instant::now()));
        (value, false)
    }

    /// Number of fresh entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|(_, (_, inserted))| self.is_fresh(*inserted))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `key`, returning whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().pop(key).is_some()
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let mut entries = self.lock();
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, (_, inserted))| !self.is_fresh(*inserted))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_entry_is_reused() {
        let cache = TtlCache::default();
        let key = "https://a.test".to_owned();
        assert_eq!(cache.get_or_insert_with(&key, || 1), (1, false));
        assert_eq!(cache.get_or_insert_with(&key, || 2), (1, true));
        assert_eq!(cache.get(&key), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_replaced() {
        let cache = TtlCache::new(Duration::ZERO);
        let key = "k";
        assert_eq!(cache.get_or_insert_with(&key, || 1), (1, false));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.get_or_insert_with(&key, || 2), (2, false));
        assert!(cache.is_empty());

        cache.purge_expired();
        assert!(!cache.invalidate(&key));
    }

    #[test]
    fn test_capacity_bounds_entries() {
        let cache = TtlCache::with_capacity(DEFAULT_TTL, 3);
        for i in 0..100 {
            cache.get_or_insert_with(&i, || i * 2);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.capacity(), 3);
        assert_eq!(cache.get(&99), Some(198));
        assert_eq!(cache.get(&0), None);
    }

    #[test]
    fn test_lookup_keeps_entry_recent() {
        let cache = TtlCache::with_capacity(DEFAULT_TTL, 2);
        cache.get_or_insert_with(&"a", || 1);
        cache.get_or_insert_with(&"b", || 2);
        assert_eq!(cache.get_or_insert_with(&"a", || 0), (1, true));
        cache.get_or_insert_with(&"c", || 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[test]
    fn test_invalidate() {
        let cache = TtlCache::new(DEFAULT_TTL);
        cache.get_or_insert_with(&1, || "one");
        assert!(cache.invalidate(&1));
        assert_eq!(cache.get_or_insert_with(&1, || "uno"), ("uno", false));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
