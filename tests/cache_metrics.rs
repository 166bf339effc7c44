use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use sitemill::{
    application::{
        error::CacheError,
        manager::SitemapManager,
        registry::SitemapRegistry,
        url::{LocaleSettings, UrlResolver},
    },
    cache::{CacheConfig, CacheStore, MemoryCacheStore},
    domain::descriptor::SitemapDefinition,
    infra::memory::{MemoryDataSource, MemoryRecord},
};
use time::macros::datetime;
use url::Url;

struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn forget(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }
}

fn manager(cache: Arc<dyn CacheStore>) -> SitemapManager {
    let registry = SitemapRegistry::new();
    registry
        .register(
            "posts",
            SitemapDefinition {
                split_by_year: true,
                ..SitemapDefinition::for_table("posts")
            },
        )
        .expect("posts descriptor");
    let source = MemoryDataSource::new().with_table(
        "posts",
        vec![
            MemoryRecord::new(1, "one", datetime!(2023-01-01 0:00 UTC)),
            MemoryRecord::new(2, "two", datetime!(2024-01-01 0:00 UTC)),
        ],
    );

    SitemapManager::new(
        Arc::new(registry),
        Arc::new(source),
        cache,
        UrlResolver::new(
            Url::parse("https://example.com/").expect("base url"),
            LocaleSettings::default(),
        ),
    )
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Miss, then hit, on a healthy store.
    let healthy = manager(Arc::new(MemoryCacheStore::new(&CacheConfig::default())));
    healthy.fetch_by_year("posts", 2024).await.expect("first fetch");
    healthy.fetch_by_year("posts", 2024).await.expect("second fetch");
    healthy.years("posts").await.expect("years");
    healthy.total_count("posts").await.expect("count");

    // Errors on an unavailable store.
    let degraded = manager(Arc::new(UnavailableStore));
    degraded.fetch_full("posts").await.expect("fallback fetch");

    // Eviction on a store that holds a single key.
    let tiny = MemoryCacheStore::new(&CacheConfig {
        capacity: 1,
        ..Default::default()
    });
    let ttl = Duration::from_secs(60);
    tiny.set("a", Bytes::from_static(b"1"), ttl).await.expect("set a");
    tiny.set("b", Bytes::from_static(b"2"), ttl).await.expect("set b");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "sitemill_cache_hit_total",
        "sitemill_cache_miss_total",
        "sitemill_cache_error_total",
        "sitemill_cache_evict_total",
        "sitemill_source_query_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
