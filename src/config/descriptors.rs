//! `[sitemaps.<name>]` tables mapped onto [`SitemapDefinition`]s.
//!
//! ```toml
//! [sitemap_defaults]
//! latest_limit = 1000
//! range_size = 10000
//!
//! [sitemaps.posts]
//! table = "posts"
//! split_strategy = "year"        # none | year | range
//! route_prefix = "blog"
//!
//! [sitemaps.products]
//! table = "products"
//! split_by_range = true          # legacy flag, same as split_strategy = "range"
//! translation_table = "product_translations"
//! ```
//!
//! Values left out of a sitemap table fall back to `[sitemap_defaults]`, then to the
//! built-in defaults of [`SitemapDefinition`]. Registration validates the result.

use std::{collections::BTreeMap, str::FromStr};

use serde::Deserialize;

use crate::domain::{
    descriptor::{Changefreq, SitemapDefinition, SourceKind, StatusFilter},
    error::ConfigurationError,
    query::FilterValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitStrategy {
    None,
    Year,
    Range,
}

impl FromStr for SplitStrategy {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(SplitStrategy::None),
            "year" | "years" => Ok(SplitStrategy::Year),
            "range" | "ranges" | "chunk" => Ok(SplitStrategy::Range),
            _ => Err(ConfigurationError::UnknownSplitStrategy(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawSitemapDefaults {
    cache_ttl_secs: Option<u64>,
    latest_ttl_secs: Option<u64>,
    latest_limit: Option<u64>,
    range_size: Option<u64>,
    chunk_size: Option<u64>,
    changefreq: Option<String>,
    priority: Option<f32>,
    latest_priority: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawSitemap {
    table: Option<String>,
    source_kind: Option<String>,
    /// Legacy spelling of `source_kind = "json"`.
    is_spatie: Option<bool>,
    translation_table: Option<String>,
    foreign_key: Option<String>,
    slug_field: Option<String>,
    title_field: Option<String>,
    name_field: Option<String>,
    date_field: Option<String>,
    status_field: Option<String>,
    status_value: Option<FilterValue>,
    /// `false` disables the status filter entirely.
    status_filter: Option<bool>,
    route_name: Option<String>,
    route_prefix: Option<String>,
    route_params: BTreeMap<String, String>,
    split_strategy: Option<String>,
    split_by_year: Option<bool>,
    split_by_range: Option<bool>,
    range_size: Option<u64>,
    cache_ttl_secs: Option<u64>,
    latest_ttl_secs: Option<u64>,
    latest_limit: Option<u64>,
    chunk_size: Option<u64>,
    changefreq: Option<String>,
    priority: Option<f32>,
    latest_priority: Option<f32>,
}

impl RawSitemap {
    pub(crate) fn into_definition(
        self,
        name: &str,
        defaults: &RawSitemapDefaults,
    ) -> Result<SitemapDefinition, ConfigurationError> {
        let base = SitemapDefinition::default();
        let (split_by_year, split_by_range) = self.split_flags(name)?;
        let source_kind = self.source_kind()?;

        let status = if self.status_filter == Some(false) {
            None
        } else {
            let mut status = base.status.clone().unwrap_or_else(|| StatusFilter {
                field: "status".to_string(),
                value: FilterValue::Int(1),
            });
            if let Some(field) = self.status_field {
                status.field = field;
            }
            if let Some(value) = self.status_value {
                status.value = value;
            }
            Some(status)
        };

        let changefreq = match self.changefreq.or_else(|| defaults.changefreq.clone()) {
            Some(value) => value.parse::<Changefreq>()?,
            None => base.changefreq,
        };

        Ok(SitemapDefinition {
            table: self.table,
            source_kind,
            slug_field: self.slug_field.unwrap_or(base.slug_field),
            title_field: self.title_field.unwrap_or(base.title_field),
            name_field: self.name_field.unwrap_or(base.name_field),
            date_field: self.date_field.unwrap_or(base.date_field),
            status,
            route_name: self.route_name,
            route_params: self
                .route_params
                .into_iter()
                .map(|(key, value)| (key, (!value.is_empty()).then_some(value)))
                .collect(),
            route_prefix: self.route_prefix,
            url_hook: None,
            query_hook: None,
            split_by_year,
            split_by_range,
            range_size: self
                .range_size
                .or(defaults.range_size)
                .unwrap_or(base.range_size),
            cache_ttl_secs: self
                .cache_ttl_secs
                .or(defaults.cache_ttl_secs)
                .unwrap_or(base.cache_ttl_secs),
            latest_ttl_secs: self
                .latest_ttl_secs
                .or(defaults.latest_ttl_secs)
                .unwrap_or(base.latest_ttl_secs),
            latest_limit: self
                .latest_limit
                .or(defaults.latest_limit)
                .unwrap_or(base.latest_limit),
            chunk_size: self
                .chunk_size
                .or(defaults.chunk_size)
                .unwrap_or(base.chunk_size),
            changefreq,
            priority: self
                .priority
                .or(defaults.priority)
                .unwrap_or(base.priority),
            latest_priority: self
                .latest_priority
                .or(defaults.latest_priority)
                .unwrap_or(base.latest_priority),
        })
    }

    /// `split_strategy` wins over the legacy boolean flags when both are present.
    /// Legacy flags may repeat `split_strategy` but never contradict it.
    fn split_flags(&self, name: &str) -> Result<(bool, bool), ConfigurationError> {
        let legacy = (
            self.split_by_year.unwrap_or(false),
            self.split_by_range.unwrap_or(false),
        );
        let Some(strategy) = self.split_strategy.as_deref() else {
            return Ok(legacy);
        };

        let flags = match strategy.parse::<SplitStrategy>()? {
            SplitStrategy::None => (false, false),
            SplitStrategy::Year => (true, false),
            SplitStrategy::Range => (false, true),
        };
        if (legacy.0 && !flags.0) || (legacy.1 && !flags.1) {
            return Err(ConfigurationError::ConflictingPartitionModes {
                name: name.to_string(),
            });
        }
        Ok(flags)
    }

    fn source_kind(&self) -> Result<SourceKind, ConfigurationError> {
        let translated = || SourceKind::Translated {
            table: self.translation_table.clone().unwrap_or_default(),
            foreign_key: self.foreign_key.clone(),
        };

        match self.source_kind.as_deref().map(str::trim) {
            Some("plain") => Ok(SourceKind::Plain),
            Some("translated") => Ok(translated()),
            Some("json") | Some("json_column") => Ok(SourceKind::JsonColumn),
            Some(other) => Err(ConfigurationError::UnknownSourceKind(other.to_string())),
            None if self.is_spatie == Some(true) => Ok(SourceKind::JsonColumn),
            None if self.translation_table.is_some() => Ok(translated()),
            None => Ok(SourceKind::Plain),
        }
    }
}
