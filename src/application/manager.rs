//! Partition-aware cache-aside orchestration.
//!
//! [`SitemapManager`] resolves a descriptor, derives the partition's cache key and either
//! returns the cached item list or queries the data source, maps every record to a
//! [`SitemapItem`] and stores the list with the partition's TTL.
//!
//! Cache failures never fail a request: they are logged, counted, and the request falls
//! through to the data source. Data source and URL errors propagate unchanged.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    application::{
        error::{CacheError, SitemapError},
        partition::{
            INDEX_KEY, INDEX_TTL, PartitionFile, PartitionKey, TOTAL_COUNT_TTL, YEARS_TTL,
            bounded_key, chunk_count, chunk_offset, total_count_key, years_key,
        },
        registry::SitemapRegistry,
        source::DataSource,
        url::UrlResolver,
    },
    cache::{CacheStore, SingleFlight},
    domain::{
        descriptor::{PartitionMode, SourceDescriptor},
        item::SitemapItem,
        query::SourceQuery,
    },
};

pub(crate) const METRIC_CACHE_HIT: &str = "sitemill_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "sitemill_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "sitemill_cache_error_total";
pub(crate) const METRIC_SOURCE_QUERY_MS: &str = "sitemill_source_query_ms";

/// One `<sitemap>` entry of the index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub loc: String,
    #[serde(with = "time::serde::rfc3339")]
    pub lastmod: OffsetDateTime,
}

/// Outcome of a request for one partition file.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionResponse {
    Items(Vec<SitemapItem>),
    /// Serve this file instead.
    Redirect(String),
}

/// Keys touched by an invalidation, in the order they were forgotten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub cleared: Vec<String>,
    pub failed: Vec<String>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress of a warmup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WarmupEvent {
    Started { sitemap: String },
    Latest { sitemap: String, items: usize },
    Year { sitemap: String, year: i32, items: usize },
    Chunk { sitemap: String, chunk: u64, chunks: u64 },
    Full { sitemap: String, items: usize },
    /// `partitions` counts this sitemap only.
    Finished { sitemap: String, partitions: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupReport {
    pub sitemaps: Vec<String>,
    /// Partitions fetched, whether served from cache or the data source.
    pub partitions: usize,
}

#[derive(Clone)]
pub struct SitemapManager {
    registry: Arc<SitemapRegistry>,
    source: Arc<dyn DataSource>,
    cache: Arc<dyn CacheStore>,
    urls: UrlResolver,
    flight: Option<Arc<SingleFlight>>,
}

impl SitemapManager {
    pub fn new(
        registry: Arc<SitemapRegistry>,
        source: Arc<dyn DataSource>,
        cache: Arc<dyn CacheStore>,
        urls: UrlResolver,
    ) -> Self {
        Self {
            registry,
            source,
            cache,
            urls,
            flight: None,
        }
    }

    /// Collapse concurrent misses on one key into a single data source call.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flight = enabled.then(|| Arc::new(SingleFlight::new()));
        self
    }

    pub fn registry(&self) -> &SitemapRegistry {
        &self.registry
    }

    pub fn urls(&self) -> &UrlResolver {
        &self.urls
    }

    pub async fn fetch_full(&self, name: &str) -> Result<Vec<SitemapItem>, SitemapError> {
        self.fetch_partition(name, PartitionKey::Full).await
    }

    /// Newest records up to the descriptor's latest limit, carrying the latest priority.
    pub async fn fetch_latest(&self, name: &str) -> Result<Vec<SitemapItem>, SitemapError> {
        self.fetch_partition(name, PartitionKey::Latest).await
    }

    pub async fn fetch_by_year(
        &self,
        name: &str,
        year: i32,
    ) -> Result<Vec<SitemapItem>, SitemapError> {
        self.fetch_partition(name, PartitionKey::Year(year)).await
    }

    pub async fn fetch_by_range(
        &self,
        name: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SitemapItem>, SitemapError> {
        self.fetch_partition(name, PartitionKey::Range { offset, limit })
            .await
    }

    /// Direct bounded fetch that ignores the descriptor's partition mode.
    pub async fn fetch_bounded(
        &self,
        name: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<SitemapItem>, SitemapError> {
        let descriptor = self.registry.require(name)?;
        let key = bounded_key(name, offset, limit);
        let query = SourceQuery::bounded(offset, limit);
        let priority = descriptor.priority();
        self.remember(&key, descriptor.cache_ttl(), || {
            self.load(&descriptor, query, priority)
        })
        .await
    }

    pub async fn total_count(&self, name: &str) -> Result<u64, SitemapError> {
        let descriptor = self.registry.require(name)?;
        self.count_for(&descriptor).await
    }

    /// Distinct years of the date field, newest first.
    pub async fn years(&self, name: &str) -> Result<Vec<i32>, SitemapError> {
        let descriptor = self.registry.require(name)?;
        self.years_for(&descriptor).await
    }

    /// Number of range chunks for a range-partitioned sitemap; zero for other modes.
    pub async fn chunk_count(&self, name: &str) -> Result<u64, SitemapError> {
        let descriptor = self.registry.require(name)?;
        self.chunks_for(&descriptor).await
    }

    /// Index document entries: the latest file of every sitemap followed by its year, chunk
    /// or full files.
    pub async fn index_entries(&self) -> Result<Vec<IndexEntry>, SitemapError> {
        self.remember(INDEX_KEY, INDEX_TTL, || async {
            let lastmod = OffsetDateTime::now_utc();
            let mut entries = Vec::new();
            for (name, descriptor) in self.registry.list() {
                for file in self.files_for(&descriptor).await? {
                    entries.push(IndexEntry {
                        loc: self.urls.absolute(&file.file_name(&name)),
                        lastmod,
                    });
                }
            }
            Ok::<_, SitemapError>(entries)
        })
        .await
    }

    /// Serve one partition file, validating the file kind against the descriptor.
    ///
    /// Unknown sitemaps, years without records, chunks outside `1..=chunks` and kinds that do
    /// not match the partition mode are [`SitemapError::NotFound`]. A full request for a
    /// range-partitioned sitemap above its redirect threshold redirects to chunk 1.
    pub async fn resolve_request(
        &self,
        name: &str,
        file: PartitionFile,
    ) -> Result<PartitionResponse, SitemapError> {
        let not_found = || SitemapError::not_found(file.file_name(name));
        let Some(descriptor) = self.registry.get(name) else {
            return Err(not_found());
        };

        let items = match (file, descriptor.mode()) {
            (PartitionFile::Full, PartitionMode::Range(_)) => {
                if self.count_for(&descriptor).await? > descriptor.chunk_size() {
                    return Ok(PartitionResponse::Redirect(
                        PartitionFile::Chunk(1).file_name(name),
                    ));
                }
                self.fetch_full(name).await?
            }
            (PartitionFile::Full, _) => self.fetch_full(name).await?,
            (PartitionFile::Latest, _) => self.fetch_latest(name).await?,
            (PartitionFile::Year(year), PartitionMode::Year) => {
                if !self.years_for(&descriptor).await?.contains(&year) {
                    return Err(not_found());
                }
                self.fetch_by_year(name, year).await?
            }
            (PartitionFile::Chunk(chunk), PartitionMode::Range(size)) => {
                let size = size.get();
                let chunks = chunk_count(self.count_for(&descriptor).await?, size);
                if chunk == 0 || chunk > chunks {
                    return Err(not_found());
                }
                self.fetch_by_range(name, chunk_offset(chunk, size), size)
                    .await?
            }
            _ => return Err(not_found()),
        };
        Ok(PartitionResponse::Items(items))
    }

    /// Forget every cache key of one sitemap, or of all sitemaps plus the index.
    ///
    /// The years list and total count are re-read (and re-cached) to enumerate year and chunk
    /// keys. Keys are forgotten one at a time; failures are reported, not raised.
    pub async fn invalidate(&self, name: Option<&str>) -> Result<InvalidationReport, SitemapError> {
        let mut report = InvalidationReport::default();
        match name {
            Some(name) => {
                let descriptor = self.registry.require(name)?;
                self.invalidate_descriptor(&descriptor, &mut report).await?;
            }
            None => {
                for (_, descriptor) in self.registry.list() {
                    self.invalidate_descriptor(&descriptor, &mut report).await?;
                }
                self.forget(INDEX_KEY.to_string(), &mut report).await;
            }
        }

        info!(
            target = "sitemill::manager",
            sitemap = name.unwrap_or("*"),
            cleared = report.cleared.len(),
            failed = report.failed.len(),
            "Sitemap cache invalidated"
        );
        Ok(report)
    }

    /// Populate the cache for one sitemap, or all of them.
    ///
    /// The latest partition is fetched first, then every year, every chunk, or the full list.
    /// A second run within the TTLs is served entirely from cache.
    pub async fn warmup<F>(
        &self,
        name: Option<&str>,
        mut progress: F,
    ) -> Result<WarmupReport, SitemapError>
    where
        F: FnMut(WarmupEvent) + Send,
    {
        let mut report = WarmupReport::default();
        match name {
            Some(name) => {
                let descriptor = self.registry.require(name)?;
                self.warm_descriptor(&descriptor, &mut progress, &mut report)
                    .await?;
            }
            None => {
                for (_, descriptor) in self.registry.list() {
                    self.warm_descriptor(&descriptor, &mut progress, &mut report)
                        .await?;
                }
                // Rebuilt on the next index request.
                if let Err(err) = self.cache.forget(INDEX_KEY).await {
                    self.cache_failure(INDEX_KEY, "forget", &err);
                }
            }
        }
        Ok(report)
    }

    async fn fetch_partition(
        &self,
        name: &str,
        partition: PartitionKey,
    ) -> Result<Vec<SitemapItem>, SitemapError> {
        let descriptor = self.registry.require(name)?;
        let key = partition.cache_key(name);
        let query = partition.query(&descriptor);
        let priority = partition.priority(&descriptor);
        self.remember(&key, partition.ttl(&descriptor), || {
            self.load(&descriptor, query, priority)
        })
        .await
    }

    async fn load(
        &self,
        descriptor: &SourceDescriptor,
        query: SourceQuery,
        priority: f32,
    ) -> Result<Vec<SitemapItem>, SitemapError> {
        let started = Instant::now();
        let records = self.source.query(descriptor, &query).await?;
        histogram!(METRIC_SOURCE_QUERY_MS, "op" => "query")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        records
            .iter()
            .map(|record| {
                let url = self.urls.resolve(descriptor, record)?;
                Ok(SitemapItem::from_record(
                    record,
                    url,
                    descriptor.changefreq(),
                    priority,
                    self.urls.title(record),
                ))
            })
            .collect()
    }

    async fn count_for(&self, descriptor: &SourceDescriptor) -> Result<u64, SitemapError> {
        self.remember(&total_count_key(descriptor.name()), TOTAL_COUNT_TTL, || async {
            let started = Instant::now();
            let total = self.source.count(descriptor).await?;
            histogram!(METRIC_SOURCE_QUERY_MS, "op" => "count")
                .record(started.elapsed().as_secs_f64() * 1000.0);
            Ok::<_, SitemapError>(total)
        })
        .await
    }

    async fn years_for(&self, descriptor: &SourceDescriptor) -> Result<Vec<i32>, SitemapError> {
        self.remember(&years_key(descriptor.name()), YEARS_TTL, || async {
            let started = Instant::now();
            let years = self.source.distinct_years(descriptor).await?;
            histogram!(METRIC_SOURCE_QUERY_MS, "op" => "years")
                .record(started.elapsed().as_secs_f64() * 1000.0);
            Ok::<_, SitemapError>(years)
        })
        .await
    }

    async fn chunks_for(&self, descriptor: &SourceDescriptor) -> Result<u64, SitemapError> {
        match descriptor.mode() {
            PartitionMode::Range(size) => {
                Ok(chunk_count(self.count_for(descriptor).await?, size.get()))
            }
            _ => Ok(0),
        }
    }

    async fn files_for(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Vec<PartitionFile>, SitemapError> {
        let mut files = vec![PartitionFile::Latest];
        match descriptor.mode() {
            PartitionMode::None => files.push(PartitionFile::Full),
            PartitionMode::Year => files.extend(
                self.years_for(descriptor)
                    .await?
                    .into_iter()
                    .map(PartitionFile::Year),
            ),
            PartitionMode::Range(_) => {
                files.extend((1..=self.chunks_for(descriptor).await?).map(PartitionFile::Chunk))
            }
        }
        Ok(files)
    }

    async fn invalidate_descriptor(
        &self,
        descriptor: &SourceDescriptor,
        report: &mut InvalidationReport,
    ) -> Result<(), SitemapError> {
        let name = descriptor.name();
        self.forget(PartitionKey::Latest.cache_key(name), report).await;
        self.forget(total_count_key(name), report).await;
        self.forget(years_key(name), report).await;

        match descriptor.mode() {
            PartitionMode::None => {
                self.forget(PartitionKey::Full.cache_key(name), report).await;
            }
            PartitionMode::Year => {
                for year in self.years_for(descriptor).await? {
                    self.forget(PartitionKey::Year(year).cache_key(name), report)
                        .await;
                }
            }
            PartitionMode::Range(size) => {
                let size = size.get();
                let chunks = chunk_count(self.count_for(descriptor).await?, size);
                for chunk in 1..=chunks {
                    let partition = PartitionKey::Range {
                        offset: chunk_offset(chunk, size),
                        limit: size,
                    };
                    self.forget(partition.cache_key(name), report).await;
                }
            }
        }
        Ok(())
    }

    async fn warm_descriptor<F>(
        &self,
        descriptor: &SourceDescriptor,
        progress: &mut F,
        report: &mut WarmupReport,
    ) -> Result<(), SitemapError>
    where
        F: FnMut(WarmupEvent) + Send,
    {
        let name = descriptor.name();
        let sitemap = || name.to_string();
        let before = report.partitions;
        progress(WarmupEvent::Started { sitemap: sitemap() });

        let latest = self.fetch_latest(name).await?;
        report.partitions += 1;
        progress(WarmupEvent::Latest {
            sitemap: sitemap(),
            items: latest.len(),
        });

        match descriptor.mode() {
            PartitionMode::None => {
                let items = self.fetch_full(name).await?;
                report.partitions += 1;
                progress(WarmupEvent::Full {
                    sitemap: sitemap(),
                    items: items.len(),
                });
            }
            PartitionMode::Year => {
                for year in self.years_for(descriptor).await? {
                    let items = self.fetch_by_year(name, year).await?;
                    report.partitions += 1;
                    progress(WarmupEvent::Year {
                        sitemap: sitemap(),
                        year,
                        items: items.len(),
                    });
                }
            }
            PartitionMode::Range(size) => {
                let size = size.get();
                let chunks = chunk_count(self.count_for(descriptor).await?, size);
                for chunk in 1..=chunks {
                    self.fetch_by_range(name, chunk_offset(chunk, size), size)
                        .await?;
                    report.partitions += 1;
                    progress(WarmupEvent::Chunk {
                        sitemap: sitemap(),
                        chunk,
                        chunks,
                    });
                }
            }
        }

        let partitions = report.partitions - before;
        progress(WarmupEvent::Finished {
            sitemap: sitemap(),
            partitions,
        });
        report.sitemaps.push(sitemap());
        info!(
            target = "sitemill::manager",
            sitemap = name,
            partitions,
            "Sitemap cache warmed"
        );
        Ok(())
    }

    /// Cache-aside read of `key`, filling it from `fetch` on a miss.
    async fn remember<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, SitemapError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SitemapError>>,
    {
        if let Some(hit) = self.lookup(key).await {
            return Ok(hit);
        }

        let _flight = match self.flight.as_ref() {
            Some(flight) => {
                let guard = flight.acquire(key).await;
                // Another holder may have filled the key while we waited.
                if let Some(hit) = self.lookup(key).await {
                    return Ok(hit);
                }
                Some(guard)
            }
            None => None,
        };

        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(target = "sitemill::cache", key, "Cache miss");
        let value = fetch().await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = match self.cache.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                self.cache_failure(key, "get", &err);
                return None;
            }
        };

        match serde_json::from_slice(&payload) {
            Ok(value) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                debug!(target = "sitemill::cache", key, "Cache hit");
                Some(value)
            }
            Err(err) => {
                let err = CacheError::Decode {
                    key: key.to_string(),
                    message: err.to_string(),
                };
                self.cache_failure(key, "decode", &err);
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                let err = CacheError::Encode {
                    key: key.to_string(),
                    message: err.to_string(),
                };
                self.cache_failure(key, "encode", &err);
                return;
            }
        };
        if let Err(err) = self.cache.set(key, payload, ttl).await {
            self.cache_failure(key, "set", &err);
        }
    }

    async fn forget(&self, key: String, report: &mut InvalidationReport) {
        match self.cache.forget(&key).await {
            Ok(()) => report.cleared.push(key),
            Err(err) => {
                self.cache_failure(&key, "forget", &err);
                report.failed.push(key);
            }
        }
    }

    fn cache_failure(&self, key: &str, op: &'static str, err: &CacheError) {
        counter!(METRIC_CACHE_ERROR, "op" => op).increment(1);
        warn!(
            target = "sitemill::cache",
            key,
            op,
            error = %err,
            "Cache operation failed; falling back to the data source"
        );
    }
}
