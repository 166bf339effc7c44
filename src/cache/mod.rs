//! Sitemill cache layer.
//!
//! Partition lists are stored as JSON payloads under concrete keys in a [`CacheStore`].
//! The store is a collaborator: the manager only needs `get`, `set` and `forget`, so an
//! external backend can replace [`MemoryCacheStore`] without touching fetch logic.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 4096
//! single_flight = true
//! ```

mod config;
mod flight;
mod lock;
mod store;

pub(crate) use lock::{rw_read, rw_write};

pub use config::CacheConfig;
pub use flight::{FlightGuard, SingleFlight};
pub use store::{CacheStore, MemoryCacheStore, NoopCacheStore};
