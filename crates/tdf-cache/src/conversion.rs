//! LRU memoization of conversion results.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Default number of cached conversions.
pub const DEFAULT_CAPACITY: usize = 256;

/// Function turning raw key material into a cache key.
pub type KeyHasher = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// SHA-256 of the parts joined by `:`, hex-encoded.
///
/// ```
/// use tdf_cache::content_hash;
///
/// assert_eq!(content_hash(&["a", "b"]), content_hash(&["a:b"]));
/// assert_eq!(content_hash(&["x"]).len(), 64);
/// ```
#[must_use]
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join(":").as_bytes());
    hex::encode(hasher.finalize())
}

/// Value returned by [`ConversionCache::get_or_compute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cached<V> {
    pub value: V,
    /// Whether the value was already resident.
    pub hit: bool,
}

/// Lookup counters and occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `0.0` before any lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner<V> {
    entries: LruCache<String, V>,
    /// Keys being computed by some caller.
    in_flight: HashSet<String>,
    hits: u64,
    misses: u64,
}

/// Thread-safe LRU cache keyed by content hash.
///
/// Values are computed outside the lock. A caller asking for a key that
/// another caller is already computing waits for that result instead of
/// computing it again.
pub struct ConversionCache<V> {
    inner: Mutex<Inner<V>>,
    computed: Condvar,
    hasher: KeyHasher,
}

/// Clears an in-flight key and wakes waiters, also when `compute` panics.
struct InFlight<'c, V> {
    cache: &'c ConversionCache<V>,
    hash: String,
}

impl<V> Drop for InFlight<'_, V> {
    fn drop(&mut self) {
        let mut inner = self.cache.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight.remove(&self.hash);
        drop(inner);
        self.cache.computed.notify_all();
    }
}

impl<V: Clone> ConversionCache<V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                in_flight: HashSet::new(),
                hits: 0,
                misses: 0,
            }),
            computed: Condvar::new(),
            hasher: Arc::new(|key| content_hash(&[key])),
        }
    }

    /// Replace the key hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Cache key for raw key material.
    #[must_use]
    pub fn key_for(&self, key: &str) -> String {
        (self.hasher)(key)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached value for `key`, computing and inserting it on a miss.
    ///
    /// `compute` runs without holding the lock, so lookups and computations
    /// for other keys proceed concurrently. Concurrent callers with the same
    /// key compute the value once: the others wait and count as hits.
    pub fn get_or_compute(&self, key: &str, compute: impl FnOnce() -> V) -> Cached<V> {
        let hash = self.key_for(key);
        let mut inner = self.lock();
        loop {
            if let Some(value) = inner.entries.get(&hash) {
                let value = value.clone();
                inner.hits += 1;
                tracing::trace!(key = %hash, "Conversion cache hit");
                return Cached { value, hit: true };
            }
            if !inner.in_flight.contains(&hash) {
                break;
            }
            inner = self
                .computed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.misses += 1;
        inner.in_flight.insert(hash.clone());
        drop(inner);

        let guard = InFlight {
            cache: self,
            hash: hash.clone(),
        };
        let value = compute();
        if let Some((evicted, _)) = self.lock().entries.push(hash, value.clone()) {
            tracing::debug!(key = %evicted, "Evicted conversion cache entry");
        }
        drop(guard);
        Cached { value, hit: false }
    }

    /// Cached value for `key`, without computing. Counts as a lookup.
    pub fn get(&self, key: &str) -> Option<V> {
        let hash = self.key_for(key);
        let mut inner = self.lock();
        let value = inner.entries.get(&hash).cloned();
        if value.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        value
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys, most recently used first.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.iter().map(|(key, _)| key.clone()).collect()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }
}

impl<V: Clone> Default for ConversionCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
