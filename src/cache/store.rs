//! Response store: a bounded LRU map whose entries expire after a fixed TTL.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::config::CacheConfig;
use super::keys::ResponseKey;
use super::lock::{rw_read, rw_write};
use super::{METRIC_EVICT, METRIC_HIT, METRIC_MISS};

const SOURCE: &str = "cache::store";

/// A buffered response ready to be replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

pub struct ResponseStore {
    entries: RwLock<LruCache<ResponseKey, Entry>>,
    ttl: Duration,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            ttl: config.ttl,
        }
    }

    pub fn get(&self, key: &ResponseKey) -> Option<CachedResponse> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`. Expired entries are dropped and count as a miss.
    pub fn get_at(&self, key: &ResponseKey, now: Instant) -> Option<CachedResponse> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let fresh = match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.response.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };

        if fresh.is_some() {
            counter!(METRIC_HIT).increment(1);
        } else {
            counter!(METRIC_MISS).increment(1);
        }
        fresh
    }

    pub fn set(&self, key: ResponseKey, response: CachedResponse) {
        self.set_at(key, response, Instant::now());
    }

    /// Store `response`, valid until `now + ttl`.
    pub fn set_at(&self, key: ResponseKey, response: CachedResponse, now: Instant) {
        let entry = Entry {
            response,
            expires_at: now + self.ttl,
        };
        let evicted = rw_write(&self.entries, SOURCE, "set").push(key.clone(), entry);
        if matches!(evicted, Some((evicted_key, _)) if evicted_key != key) {
            counter!(METRIC_EVICT).increment(1);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
