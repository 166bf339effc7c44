use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, StatusCode,
        header::{CONTENT_TYPE, LOCATION},
    },
    response::Response,
};
use sitemill::{
    application::{
        manager::SitemapManager,
        registry::SitemapRegistry,
        url::{LocaleSettings, UrlResolver},
    },
    cache::{CacheConfig, MemoryCacheStore},
    domain::{descriptor::SitemapDefinition, error::ConfigurationError},
    infra::{
        http::{HttpState, build_router},
        memory::{MemoryDataSource, MemoryRecord},
    },
};
use time::{Duration, macros::datetime};
use tower::ServiceExt;
use url::Url;

fn app(source: Arc<MemoryDataSource>) -> Router {
    let registry = SitemapRegistry::new();
    registry
        .register(
            "posts",
            SitemapDefinition {
                split_by_range: true,
                range_size: 10,
                chunk_size: 20,
                ..SitemapDefinition::for_table("posts")
            },
        )
        .expect("posts descriptor");
    registry
        .register(
            "pages",
            SitemapDefinition {
                split_by_year: true,
                route_prefix: Some("p".to_string()),
                ..SitemapDefinition::for_table("pages")
            },
        )
        .expect("pages descriptor");

    let manager = SitemapManager::new(
        Arc::new(registry),
        source,
        Arc::new(MemoryCacheStore::new(&CacheConfig::default())),
        UrlResolver::new(
            Url::parse("https://example.com/").expect("base url"),
            LocaleSettings::default(),
        ),
    );
    build_router(HttpState::new(Arc::new(manager)))
}

fn source() -> Arc<MemoryDataSource> {
    let posts = (1..=25)
        .map(|id| {
            MemoryRecord::new(
                id,
                format!("post-{id}"),
                datetime!(2024-01-01 0:00 UTC) + Duration::hours(id),
            )
        })
        .collect();
    let pages = vec![
        MemoryRecord::new(1, "about & contact", datetime!(2023-06-01 12:00 UTC)),
        MemoryRecord::new(2, "terms", datetime!(2024-02-01 12:00 UTC)),
    ];
    Arc::new(
        MemoryDataSource::new()
            .with_table("posts", posts)
            .with_table("pages", pages),
    )
}

async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn index_lists_every_partition_file() {
    let app = app(source());
    let response = get(&app, "/sitemap.xml").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/xml"));

    let body = body_text(response).await;
    assert!(body.contains("<sitemapindex"));
    for file in [
        "sitemap-pages-latest.xml",
        "sitemap-pages-2024.xml",
        "sitemap-pages-2023.xml",
        "sitemap-posts-latest.xml",
        "sitemap-posts-part-1.xml",
        "sitemap-posts-part-3.xml",
    ] {
        assert!(
            body.contains(&format!("<loc>https://example.com/{file}</loc>")),
            "missing {file}"
        );
    }
}

#[tokio::test]
async fn partition_files_render_escaped_urlsets() {
    let app = app(source());
    let response = get(&app, "/sitemap-pages-2023.xml").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<urlset"));
    assert!(body.contains("<loc>https://example.com/p/1/about%20&amp;%20contact</loc>"));
    assert!(body.contains("<lastmod>2023-06-01T12:00:00+00:00</lastmod>"));
    assert!(!body.contains("/p/2/terms"));
}

#[tokio::test]
async fn chunk_files_serve_their_slice() {
    let app = app(source());
    let body = body_text(get(&app, "/sitemap-posts-part-3.xml").await).await;

    assert_eq!(body.matches("<url>").count(), 5);
}

#[tokio::test]
async fn oversized_full_request_redirects_to_first_chunk() {
    let app = app(source());
    let response = get(&app, "/sitemap-posts.xml").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[LOCATION],
        "https://example.com/sitemap-posts-part-1.xml"
    );
}

#[tokio::test]
async fn unknown_files_are_not_found() {
    let app = app(source());

    for uri in [
        "/sitemap-posts-part-9.xml",
        "/sitemap-pages-1999.xml",
        "/sitemap-videos.xml",
        "/robots.txt",
    ] {
        assert_eq!(
            get(&app, uri).await.status(),
            StatusCode::NOT_FOUND,
            "{uri} should be missing"
        );
    }
}

#[tokio::test]
async fn data_source_failures_are_service_unavailable() {
    let source = source();
    source.set_failing(true);
    let app = app(source);

    let response = get(&app, "/sitemap-pages-latest.xml").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn dashed_names_serve_the_files_the_index_lists() {
    let registry = SitemapRegistry::new();
    assert_eq!(
        registry
            .register("top-2024", SitemapDefinition::for_table("posts"))
            .unwrap_err(),
        ConfigurationError::AmbiguousName("top-2024".to_string())
    );
    registry
        .register("top-2024-picks", SitemapDefinition::for_table("posts"))
        .expect("dashed descriptor");

    let manager = SitemapManager::new(
        Arc::new(registry),
        source(),
        Arc::new(MemoryCacheStore::new(&CacheConfig::default())),
        UrlResolver::new(
            Url::parse("https://example.com/").expect("base url"),
            LocaleSettings::default(),
        ),
    );
    let app = build_router(HttpState::new(Arc::new(manager)));

    let index = body_text(get(&app, "/sitemap.xml").await).await;
    assert!(index.contains("https://example.com/sitemap-top-2024-picks.xml"));

    let response = get(&app, "/sitemap-top-2024-picks.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await.matches("<url>").count(), 25);
}
