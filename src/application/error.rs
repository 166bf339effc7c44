use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    domain::{descriptor::HookError, error::ConfigurationError},
    infra::error::InfraError,
};

/// Failure reported by a data source. Propagated unchanged, never retried.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("query for sitemap `{sitemap}` failed: {message}")]
    Query { sitemap: String, message: String },
    #[error("sitemap `{sitemap}` cannot be served by this source: {message}")]
    Unsupported { sitemap: String, message: String },
    #[error("data source timed out")]
    Timeout,
}

impl DataSourceError {
    pub fn query(sitemap: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Query {
            sitemap: sitemap.into(),
            message: err.to_string(),
        }
    }

    pub fn unsupported(sitemap: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            sitemap: sitemap.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by a cache store. Callers degrade to the data source instead of failing.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),
    #[error("failed to encode cache entry `{key}`: {message}")]
    Encode { key: String, message: String },
    #[error("failed to decode cache entry `{key}`: {message}")]
    Decode { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum UrlGenerationError {
    #[error("url hook for sitemap `{sitemap}` failed")]
    Hook {
        sitemap: String,
        #[source]
        source: HookError,
    },
    #[error("route `{route}` requires parameter `{parameter}`")]
    MissingParameter { route: String, parameter: String },
    #[error("route `{0}` is not defined")]
    UnknownRoute(String),
}

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Url(#[from] UrlGenerationError),
    #[error("sitemap partition `{0}` not found")]
    NotFound(String),
}

impl SitemapError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<SitemapError> for HttpError {
    fn from(error: SitemapError) -> Self {
        const SOURCE: &str = "infra::http::sitemap_error_to_http_error";
        match error {
            SitemapError::NotFound(what) => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Sitemap not found",
                format!("No sitemap file matches `{what}`"),
            ),
            SitemapError::DataSource(err) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &err,
            ),
            SitemapError::Url(err) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate sitemap",
                &err,
            ),
            SitemapError::Configuration(ConfigurationError::UnknownSitemap(name)) => {
                HttpError::new(
                    SOURCE,
                    StatusCode::NOT_FOUND,
                    "Sitemap not found",
                    format!("Sitemap `{name}` is not registered"),
                )
            }
            SitemapError::Configuration(err) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service misconfigured",
                &err,
            ),
        }
    }
}

/// Top-level error of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sitemap(#[from] SitemapError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
