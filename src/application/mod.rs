//! Sitemap orchestration: registry, URL resolution, partitioning and the cache-aside manager.

pub mod error;
pub mod manager;
pub mod partition;
pub mod registry;
pub mod router;
pub mod source;
pub mod url;
