//! Declarative configuration for one logical sitemap source.
//!
//! A [`SitemapDefinition`] is the unvalidated input a host fills in (from configuration or
//! code). Registration turns it into an immutable [`SourceDescriptor`]; every invariant is
//! checked once, there, so fetch paths never see an inconsistent descriptor.

use std::{
    collections::BTreeMap, error::Error as StdError, fmt, num::NonZeroU64, str::FromStr,
    sync::Arc, time::Duration,
};

use serde::{Deserialize, Serialize};

use super::{
    error::ConfigurationError,
    item::SourceRecord,
    query::{FilterValue, SourceQuery},
};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_LATEST_TTL_SECS: u64 = 600;
pub const DEFAULT_LATEST_LIMIT: u64 = 1000;
pub const DEFAULT_RANGE_SIZE: u64 = 10_000;
pub const DEFAULT_CHUNK_SIZE: u64 = 50_000;
pub const DEFAULT_PRIORITY: f32 = 0.5;
pub const DEFAULT_LATEST_PRIORITY: f32 = 0.8;

pub type HookError = Box<dyn StdError + Send + Sync>;

/// Overrides URL generation for every record of a descriptor.
pub type UrlHook =
    Arc<dyn Fn(&SourceRecord, &SourceDescriptor) -> Result<String, HookError> + Send + Sync>;

/// Narrows the selection of a descriptor before it reaches the data source.
pub type QueryHook = Arc<dyn Fn(&mut SourceQuery) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Changefreq {
    Always,
    Hourly,
    Daily,
    #[default]
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl Changefreq {
    pub fn as_str(self) -> &'static str {
        match self {
            Changefreq::Always => "always",
            Changefreq::Hourly => "hourly",
            Changefreq::Daily => "daily",
            Changefreq::Weekly => "weekly",
            Changefreq::Monthly => "monthly",
            Changefreq::Yearly => "yearly",
            Changefreq::Never => "never",
        }
    }
}

impl fmt::Display for Changefreq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Changefreq {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Changefreq::Always),
            "hourly" => Ok(Changefreq::Hourly),
            "daily" => Ok(Changefreq::Daily),
            "weekly" => Ok(Changefreq::Weekly),
            "monthly" => Ok(Changefreq::Monthly),
            "yearly" => Ok(Changefreq::Yearly),
            "never" => Ok(Changefreq::Never),
            _ => Err(ConfigurationError::UnknownChangefreq(value.to_string())),
        }
    }
}

/// How a descriptor's records are split into addressable files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    None,
    Year,
    Range(NonZeroU64),
}

impl PartitionMode {
    pub fn range_size(self) -> Option<u64> {
        match self {
            PartitionMode::Range(size) => Some(size.get()),
            _ => None,
        }
    }
}

/// Record shape stored by the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Slug and name live on the base table.
    #[default]
    Plain,
    /// Slug and title live in a per-locale translation table joined on a foreign key.
    Translated {
        table: String,
        foreign_key: Option<String>,
    },
    /// Slug (and possibly name) is a JSON object keyed by locale.
    JsonColumn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    pub field: String,
    pub value: FilterValue,
}

/// Unvalidated descriptor input.
#[derive(Clone)]
pub struct SitemapDefinition {
    pub table: Option<String>,
    pub source_kind: SourceKind,
    pub slug_field: String,
    pub title_field: String,
    pub name_field: String,
    pub date_field: String,
    pub status: Option<StatusFilter>,
    pub route_name: Option<String>,
    pub route_params: BTreeMap<String, Option<String>>,
    pub route_prefix: Option<String>,
    pub url_hook: Option<UrlHook>,
    pub query_hook: Option<QueryHook>,
    pub split_by_year: bool,
    pub split_by_range: bool,
    pub range_size: u64,
    pub cache_ttl_secs: u64,
    pub latest_ttl_secs: u64,
    pub latest_limit: u64,
    pub chunk_size: u64,
    pub changefreq: Changefreq,
    pub priority: f32,
    pub latest_priority: f32,
}

impl Default for SitemapDefinition {
    fn default() -> Self {
        Self {
            table: None,
            source_kind: SourceKind::Plain,
            slug_field: "slug".to_string(),
            title_field: "title".to_string(),
            name_field: "name".to_string(),
            date_field: "created_at".to_string(),
            status: Some(StatusFilter {
                field: "status".to_string(),
                value: FilterValue::Int(1),
            }),
            route_name: None,
            route_params: BTreeMap::new(),
            route_prefix: None,
            url_hook: None,
            query_hook: None,
            split_by_year: false,
            split_by_range: false,
            range_size: DEFAULT_RANGE_SIZE,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            latest_ttl_secs: DEFAULT_LATEST_TTL_SECS,
            latest_limit: DEFAULT_LATEST_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            changefreq: Changefreq::Weekly,
            priority: DEFAULT_PRIORITY,
            latest_priority: DEFAULT_LATEST_PRIORITY,
        }
    }
}

impl SitemapDefinition {
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for SitemapDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SitemapDefinition")
            .field("table", &self.table)
            .field("source_kind", &self.source_kind)
            .field("route_name", &self.route_name)
            .field("route_prefix", &self.route_prefix)
            .field("url_hook", &self.url_hook.is_some())
            .field("query_hook", &self.query_hook.is_some())
            .field("split_by_year", &self.split_by_year)
            .field("split_by_range", &self.split_by_range)
            .field("range_size", &self.range_size)
            .finish_non_exhaustive()
    }
}

/// Validated, immutable configuration for one sitemap source.
#[derive(Clone)]
pub struct SourceDescriptor {
    name: String,
    table: Option<String>,
    source_kind: SourceKind,
    slug_field: String,
    title_field: String,
    name_field: String,
    date_field: String,
    status: Option<StatusFilter>,
    route_name: Option<String>,
    route_params: BTreeMap<String, Option<String>>,
    route_prefix: Option<String>,
    url_hook: Option<UrlHook>,
    query_hook: Option<QueryHook>,
    mode: PartitionMode,
    cache_ttl: Duration,
    latest_ttl: Duration,
    latest_limit: u64,
    chunk_size: u64,
    changefreq: Changefreq,
    priority: f32,
    latest_priority: f32,
}

impl SourceDescriptor {
    /// Validate a definition under the given name.
    pub fn new(
        name: impl Into<String>,
        definition: SitemapDefinition,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ConfigurationError::InvalidName(name));
        }

        let mode = match (definition.split_by_year, definition.split_by_range) {
            (true, true) => {
                return Err(ConfigurationError::ConflictingPartitionModes { name });
            }
            (true, false) => PartitionMode::Year,
            (false, true) => match NonZeroU64::new(definition.range_size) {
                Some(size) => PartitionMode::Range(size),
                None => return Err(ConfigurationError::ZeroRangeSize { name }),
            },
            (false, false) => PartitionMode::None,
        };

        check_priority(&name, definition.priority)?;
        check_priority(&name, definition.latest_priority)?;

        if definition.latest_limit == 0 {
            return Err(ConfigurationError::ZeroLatestLimit { name });
        }

        if let Some(table) = definition.table.as_deref() {
            check_identifier(&name, "table", table)?;
        }
        check_identifier(&name, "slug_field", &definition.slug_field)?;
        check_identifier(&name, "title_field", &definition.title_field)?;
        check_identifier(&name, "name_field", &definition.name_field)?;
        check_identifier(&name, "date_field", &definition.date_field)?;
        if let Some(status) = definition.status.as_ref() {
            check_identifier(&name, "status_field", &status.field)?;
        }
        if let SourceKind::Translated { table, foreign_key } = &definition.source_kind {
            check_identifier(&name, "translation_table", table)?;
            if let Some(foreign_key) = foreign_key.as_deref() {
                check_identifier(&name, "foreign_key", foreign_key)?;
            }
        }

        Ok(Self {
            name,
            table: definition.table,
            source_kind: definition.source_kind,
            slug_field: definition.slug_field,
            title_field: definition.title_field,
            name_field: definition.name_field,
            date_field: definition.date_field,
            status: definition.status,
            route_name: definition.route_name.filter(|value| !value.is_empty()),
            route_params: definition.route_params,
            route_prefix: definition
                .route_prefix
                .map(|prefix| prefix.trim_matches('/').to_string())
                .filter(|prefix| !prefix.is_empty()),
            url_hook: definition.url_hook,
            query_hook: definition.query_hook,
            mode,
            cache_ttl: Duration::from_secs(definition.cache_ttl_secs),
            latest_ttl: Duration::from_secs(definition.latest_ttl_secs),
            latest_limit: definition.latest_limit,
            chunk_size: definition.chunk_size,
            changefreq: definition.changefreq,
            priority: definition.priority,
            latest_priority: definition.latest_priority,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn source_kind(&self) -> &SourceKind {
        &self.source_kind
    }

    pub fn slug_field(&self) -> &str {
        &self.slug_field
    }

    pub fn title_field(&self) -> &str {
        &self.title_field
    }

    pub fn name_field(&self) -> &str {
        &self.name_field
    }

    pub fn date_field(&self) -> &str {
        &self.date_field
    }

    pub fn status(&self) -> Option<&StatusFilter> {
        self.status.as_ref()
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route_name.as_deref()
    }

    pub fn route_params(&self) -> &BTreeMap<String, Option<String>> {
        &self.route_params
    }

    pub fn route_prefix(&self) -> Option<&str> {
        self.route_prefix.as_deref()
    }

    pub fn url_hook(&self) -> Option<&UrlHook> {
        self.url_hook.as_ref()
    }

    pub fn mode(&self) -> PartitionMode {
        self.mode
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn latest_ttl(&self) -> Duration {
        self.latest_ttl
    }

    pub fn latest_limit(&self) -> u64 {
        self.latest_limit
    }

    /// Record count above which a full request for a range-split sitemap redirects to chunk 1.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn changefreq(&self) -> Changefreq {
        self.changefreq
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn latest_priority(&self) -> f32 {
        self.latest_priority
    }

    /// Apply the descriptor's query hook, if any.
    pub fn scope_query(&self, query: &mut SourceQuery) {
        if let Some(hook) = self.query_hook.as_ref() {
            hook(query);
        }
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("source_kind", &self.source_kind)
            .field("mode", &self.mode)
            .field("route_name", &self.route_name)
            .field("route_prefix", &self.route_prefix)
            .field("url_hook", &self.url_hook.is_some())
            .field("query_hook", &self.query_hook.is_some())
            .finish_non_exhaustive()
    }
}

fn check_priority(name: &str, value: f32) -> Result<(), ConfigurationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::PriorityOutOfRange {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

fn check_identifier(name: &str, field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(ConfigurationError::invalid_identifier(name, field, value))
    }
}

/// SQL identifier, optionally schema-qualified (`schema.table`).
pub fn is_valid_identifier(value: &str) -> bool {
    let mut parts = value.split('.');
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), None, None) => valid_part(first),
        (Some(schema), Some(table), None) => valid_part(schema) && valid_part(table),
        _ => false,
    }
}

fn is_valid_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_partition_modes_is_a_configuration_error() {
        let definition = SitemapDefinition {
            split_by_year: true,
            split_by_range: true,
            ..SitemapDefinition::for_table("posts")
        };

        let err = SourceDescriptor::new("posts", definition).expect_err("conflicting modes");
        assert_eq!(
            err,
            ConfigurationError::ConflictingPartitionModes {
                name: "posts".to_string()
            }
        );
    }

    #[test]
    fn zero_range_size_is_rejected() {
        let definition = SitemapDefinition {
            split_by_range: true,
            range_size: 0,
            ..SitemapDefinition::for_table("posts")
        };

        assert!(matches!(
            SourceDescriptor::new("posts", definition),
            Err(ConfigurationError::ZeroRangeSize { .. })
        ));
    }

    #[test]
    fn priority_must_be_within_unit_interval() {
        let definition = SitemapDefinition {
            latest_priority: 1.5,
            ..SitemapDefinition::for_table("posts")
        };

        assert!(matches!(
            SourceDescriptor::new("posts", definition),
            Err(ConfigurationError::PriorityOutOfRange { .. })
        ));
    }

    #[test]
    fn identifiers_are_checked() {
        let definition = SitemapDefinition {
            date_field: "created_at; drop table posts".to_string(),
            ..SitemapDefinition::for_table("posts")
        };

        assert!(matches!(
            SourceDescriptor::new("posts", definition),
            Err(ConfigurationError::InvalidIdentifier {
                field: "date_field",
                ..
            })
        ));
        assert!(is_valid_identifier("public.posts"));
        assert!(!is_valid_identifier("1posts"));
        assert!(!is_valid_identifier("a.b.c"));
    }

    #[test]
    fn names_cannot_contain_key_separators() {
        assert!(matches!(
            SourceDescriptor::new("blog.posts", SitemapDefinition::for_table("posts")),
            Err(ConfigurationError::InvalidName(_))
        ));
    }

    #[test]
    fn range_mode_carries_its_size() {
        let definition = SitemapDefinition {
            split_by_range: true,
            range_size: 250,
            route_prefix: Some("/articles/".to_string()),
            ..SitemapDefinition::for_table("articles")
        };

        let descriptor = SourceDescriptor::new("articles", definition).expect("valid");
        assert_eq!(descriptor.mode().range_size(), Some(250));
        assert_eq!(descriptor.route_prefix(), Some("articles"));
        assert_eq!(descriptor.cache_ttl(), Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
    }

    #[test]
    fn changefreq_parses_case_insensitively() {
        assert_eq!("Daily".parse::<Changefreq>(), Ok(Changefreq::Daily));
        assert!("fortnightly".parse::<Changefreq>().is_err());
    }
}
