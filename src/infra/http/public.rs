use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        error::HttpError,
        manager::{PartitionResponse, SitemapManager},
        partition::{INDEX_FILE, PartitionFile},
    },
    presentation::xml::{render_index, render_urlset},
};

use super::{
    admin,
    middleware::{log_responses, set_request_context},
};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub manager: Arc<SitemapManager>,
    /// Bearer token for the admin routes; `None` leaves them unmounted.
    pub admin_token: Option<Arc<str>>,
}

impl HttpState {
    pub fn new(manager: Arc<SitemapManager>) -> Self {
        Self {
            manager,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }
}

pub fn build_router(state: HttpState) -> Router {
    let mut router = Router::new()
        .route(&format!("/{INDEX_FILE}"), get(sitemap_index))
        .route("/{file}", get(sitemap_file));
    if state.admin_token.is_some() {
        router = router.merge(admin::routes(state.clone()));
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn sitemap_index(State(state): State<HttpState>) -> Response {
    match state.manager.index_entries().await {
        Ok(entries) => xml_response(render_index(&entries)),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn sitemap_file(State(state): State<HttpState>, Path(file): Path<String>) -> Response {
    let Some((name, partition)) = PartitionFile::parse(&file) else {
        return HttpError::new(
            "infra::http::public::sitemap_file",
            StatusCode::NOT_FOUND,
            "Sitemap not found",
            format!("`{file}` is not a sitemap file name"),
        )
        .into_response();
    };

    match state.manager.resolve_request(&name, partition).await {
        Ok(PartitionResponse::Items(items)) => xml_response(render_urlset(&items)),
        Ok(PartitionResponse::Redirect(target)) => {
            redirect_response(&state.manager.urls().absolute(&target))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn xml_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, XML_CONTENT_TYPE)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn redirect_response(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .header(CACHE_CONTROL, "no-store")
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
