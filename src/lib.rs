//! Partitioned, cache-aside sitemap generation for large record collections.
//!
//! A [`SitemapManager`](application::manager::SitemapManager) splits each registered
//! collection into full, latest, per-year or fixed-size range partitions, caches every
//! partition under a deterministic key and resolves one canonical URL per record.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
