//! Cache configuration.
//!
//! Controls the in-process sitemap cache via the `[cache]` table of `sitemill.toml`.

use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Store partitions at all. When off every request reaches the data source.
    pub enabled: bool,
    /// Maximum number of cache keys held before LRU eviction.
    pub capacity: usize,
    /// Collapse concurrent misses on one key into a single data-source call.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            single_flight: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity,
            single_flight: settings.single_flight,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
