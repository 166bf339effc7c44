//! Partition kinds, cache keys and file naming.
//!
//! Every cache key is a pure function of a descriptor name and a partition, so invalidation
//! can enumerate concrete keys instead of deleting by pattern.

use std::time::Duration;

use crate::domain::{descriptor::SourceDescriptor, query::SourceQuery};

pub const TOTAL_COUNT_TTL: Duration = Duration::from_secs(86_400);
pub const YEARS_TTL: Duration = Duration::from_secs(7_200);
pub const INDEX_TTL: Duration = Duration::from_secs(3_600);

pub const INDEX_KEY: &str = "sitemap.index";
pub const INDEX_FILE: &str = "sitemap.xml";

const KEY_PREFIX: &str = "sitemap";
const FILE_PREFIX: &str = "sitemap-";
const FILE_SUFFIX: &str = ".xml";

/// One addressable slice of a descriptor's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    Full,
    Latest,
    Year(i32),
    Range { offset: u64, limit: u64 },
}

impl PartitionKey {
    pub fn cache_key(&self, name: &str) -> String {
        match self {
            PartitionKey::Full => format!("{KEY_PREFIX}.{name}"),
            PartitionKey::Latest => format!("{KEY_PREFIX}.{name}.latest"),
            PartitionKey::Year(year) => format!("{KEY_PREFIX}.{name}.year.{year}"),
            PartitionKey::Range { offset, limit } => {
                format!("{KEY_PREFIX}.{name}.range.{offset}.{limit}")
            }
        }
    }

    pub fn ttl(&self, descriptor: &SourceDescriptor) -> Duration {
        match self {
            PartitionKey::Latest => descriptor.latest_ttl(),
            _ => descriptor.cache_ttl(),
        }
    }

    /// Selection for this partition before the descriptor's query hook runs.
    pub fn query(&self, descriptor: &SourceDescriptor) -> SourceQuery {
        match *self {
            PartitionKey::Full => SourceQuery::all(),
            PartitionKey::Latest => SourceQuery::bounded(None, Some(descriptor.latest_limit())),
            PartitionKey::Year(year) => SourceQuery::year(year),
            PartitionKey::Range { offset, limit } => SourceQuery::bounded(Some(offset), Some(limit)),
        }
    }

    pub fn priority(&self, descriptor: &SourceDescriptor) -> f32 {
        match self {
            PartitionKey::Latest => descriptor.latest_priority(),
            _ => descriptor.priority(),
        }
    }
}

pub fn total_count_key(name: &str) -> String {
    format!("{KEY_PREFIX}.{name}.total_count")
}

pub fn years_key(name: &str) -> String {
    format!("{KEY_PREFIX}.{name}.years")
}

/// Key of a direct bounded fetch: `sitemap.<name>[.range.<offset>][.limit.<limit>]`.
pub fn bounded_key(name: &str, offset: Option<u64>, limit: Option<u64>) -> String {
    let mut key = format!("{KEY_PREFIX}.{name}");
    if let Some(offset) = offset {
        key.push_str(&format!(".range.{offset}"));
    }
    if let Some(limit) = limit {
        key.push_str(&format!(".limit.{limit}"));
    }
    key
}

/// Number of range chunks needed for `total` records.
pub fn chunk_count(total: u64, range_size: u64) -> u64 {
    if range_size == 0 {
        return 0;
    }
    total.div_ceil(range_size)
}

/// Offset of a 1-based chunk.
pub fn chunk_offset(chunk: u64, range_size: u64) -> u64 {
    chunk.saturating_sub(1) * range_size
}

/// Published sitemap file of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionFile {
    Full,
    Latest,
    Year(i32),
    /// 1-based range chunk.
    Chunk(u64),
}

impl PartitionFile {
    pub fn file_name(&self, name: &str) -> String {
        match self {
            PartitionFile::Full => format!("{FILE_PREFIX}{name}{FILE_SUFFIX}"),
            PartitionFile::Latest => format!("{FILE_PREFIX}{name}-latest{FILE_SUFFIX}"),
            PartitionFile::Year(year) => format!("{FILE_PREFIX}{name}-{year}{FILE_SUFFIX}"),
            PartitionFile::Chunk(chunk) => format!("{FILE_PREFIX}{name}-part-{chunk}{FILE_SUFFIX}"),
        }
    }

    /// Split a request path such as `sitemap-posts-part-2.xml` into name and file.
    ///
    /// Chunk files are matched before year files so a name ending in `-part` stays unambiguous.
    pub fn parse(file: &str) -> Option<(String, PartitionFile)> {
        let stem = file.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }

        if let Some(name) = stem.strip_suffix("-latest") {
            return non_empty(name, PartitionFile::Latest);
        }

        if let Some((name, chunk)) = stem.rsplit_once("-part-")
            && is_digits(chunk)
        {
            let chunk = chunk.parse().ok()?;
            return non_empty(name, PartitionFile::Chunk(chunk));
        }

        if let Some((name, year)) = stem.rsplit_once('-')
            && year.len() == 4
            && is_digits(year)
        {
            let year = year.parse().ok()?;
            return non_empty(name, PartitionFile::Year(year));
        }

        Some((stem.to_string(), PartitionFile::Full))
    }
}

fn non_empty(name: &str, file: PartitionFile) -> Option<(String, PartitionFile)> {
    (!name.is_empty()).then(|| (name.to_string(), file))
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
