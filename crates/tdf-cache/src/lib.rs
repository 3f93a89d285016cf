//! In-memory caches shared by concurrent conversions.
//!
//! - [`ConversionCache`]: capacity-bounded LRU map from a content hash to a
//!   conversion result
//! - [`TtlCache`]: map whose entries expire after a fixed time-to-live, used
//!   for deployment classification
//!
//! Both are bounded and guard their state with a mutex. A poisoned lock is
//! recovered rather than propagated. [`ConversionCache`] computes values
//! outside its lock and lets concurrent callers for one key share a single
//! computation.
//!
//! # Example
//!
//! ```
//! use tdf_cache::ConversionCache;
//!
//! let cache = ConversionCache::new(16);
//! let first = cache.get_or_compute("input", || "output".to_owned());
//! let second = cache.get_or_compute("input", || unreachable!());
//!
//! assert!(!first.hit);
//! assert!(second.hit);
//! assert_eq!(second.value, "output");
//! ```

mod conversion;
mod ttl;

pub use conversion::{CacheStats, Cached, ConversionCache, DEFAULT_CAPACITY, KeyHasher, content_hash};
pub use ttl::{DEFAULT_TTL, DEFAULT_TTL_CAPACITY, TtlCache};
