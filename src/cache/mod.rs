//! Page response cache.
//!
//! Rendered responses of the routes it wraps are kept for a fixed time-to-live
//! in a bounded LRU store. Writes to posts do not touch the cache: entries go
//! stale until they expire or an administrator clears everything.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 20
//! capacity = 200
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use keys::{ResponseKey, hash_query};
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CachedResponse, ResponseStore};

pub const METRIC_HIT: &str = "yatube_cache_hit_total";
pub const METRIC_MISS: &str = "yatube_cache_miss_total";
pub const METRIC_EVICT: &str = "yatube_cache_evict_total";
pub const METRIC_CLEAR: &str = "yatube_cache_clear_total";
