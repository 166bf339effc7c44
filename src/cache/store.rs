//! Cache store collaborators.
//!
//! The manager talks to any [`CacheStore`] with opaque byte payloads and concrete keys;
//! there is no wildcard deletion. [`MemoryCacheStore`] is the in-process implementation:
//! an LRU map with a per-entry deadline.

use std::{sync::RwLock, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use crate::application::error::CacheError;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
pub(crate) const METRIC_CACHE_EVICT: &str = "sitemill_cache_evict_total";

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value` under `key` for `ttl`. A zero TTL stores nothing and drops any previous value.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    async fn forget(&self, key: &str) -> Result<(), CacheError>;
}

struct CachedEntry {
    value: Bytes,
    expires_at: Instant,
}

/// In-process LRU cache with TTL expiry checked on read.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, CachedEntry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Number of entries held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        if ttl.is_zero() {
            entries.pop(key);
            return Ok(());
        }

        let entry = CachedEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Some((evicted, _)) = entries.push(key.to_string(), entry)
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "forget").pop(key);
        Ok(())
    }
}

/// Store used when caching is disabled: every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
