//! Rendering of sitemap documents.

pub mod xml;
