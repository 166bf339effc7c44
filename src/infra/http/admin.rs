//! Cache maintenance routes for a running server.
//!
//! `sitemill clear` and `sitemill warmup` call these so they act on the cache the server
//! actually serves from. Every route requires the configured admin token as a bearer token.

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::info;

use crate::application::{
    error::HttpError,
    manager::{WarmupEvent, WarmupReport},
};

use super::public::HttpState;

pub const INVALIDATE_PATH: &str = "/_admin/cache/invalidate";
pub const WARMUP_PATH: &str = "/_admin/cache/warmup";

const SOURCE: &str = "infra::http::admin";

/// Request body of both admin routes. No sitemap means every sitemap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTarget {
    #[serde(default)]
    pub sitemap: Option<String>,
}

/// Warmup outcome together with the progress events in the order they happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupSummary {
    #[serde(flatten)]
    pub report: WarmupReport,
    pub events: Vec<WarmupEvent>,
}

pub(super) fn routes(state: HttpState) -> Router<HttpState> {
    Router::new()
        .route(INVALIDATE_PATH, post(invalidate_cache))
        .route(WARMUP_PATH, post(warm_cache))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

async fn require_admin_token(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Not found",
            "admin routes are disabled",
        )
        .into_response();
    };

    let authorized = bearer_token(request.headers().get(AUTHORIZATION))
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())));
    if !authorized {
        return HttpError::new(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "missing or invalid admin token",
        )
        .into_response();
    }

    next.run(request).await
}

fn bearer_token(header: Option<&HeaderValue>) -> Option<&str> {
    header?.to_str().ok()?.strip_prefix("Bearer ")
}

async fn invalidate_cache(
    State(state): State<HttpState>,
    Json(target): Json<CacheTarget>,
) -> Response {
    match state.manager.invalidate(target.sitemap.as_deref()).await {
        Ok(report) => {
            info!(
                target = "sitemill::http::admin",
                sitemap = target.sitemap.as_deref().unwrap_or("*"),
                cleared = report.cleared.len(),
                failed = report.failed.len(),
                "Cache invalidated on request"
            );
            Json(report).into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn warm_cache(State(state): State<HttpState>, Json(target): Json<CacheTarget>) -> Response {
    let mut events = Vec::new();
    let result = state
        .manager
        .warmup(target.sitemap.as_deref(), |event| events.push(event))
        .await;

    match result {
        Ok(report) => {
            info!(
                target = "sitemill::http::admin",
                sitemap = target.sitemap.as_deref().unwrap_or("*"),
                partitions = report.partitions,
                "Cache warmed on request"
            );
            Json(WarmupSummary { report, events }).into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_the_scheme() {
        let header = HeaderValue::from_static("Bearer s3cret");
        assert_eq!(bearer_token(Some(&header)), Some("s3cret"));

        let header = HeaderValue::from_static("Basic s3cret");
        assert_eq!(bearer_token(Some(&header)), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn warmup_summary_flattens_the_report() {
        let summary = WarmupSummary {
            report: WarmupReport {
                sitemaps: vec!["posts".to_string()],
                partitions: 2,
            },
            events: vec![WarmupEvent::Started {
                sitemap: "posts".to_string(),
            }],
        };

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["partitions"], 2);
        assert_eq!(value["events"][0]["event"], "started");
        assert_eq!(value["events"][0]["sitemap"], "posts");
    }
}
