use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::{
    application::manager::InvalidationReport,
    infra::http::{CacheTarget, INVALIDATE_PATH, WARMUP_PATH, WarmupSummary},
};

#[derive(Debug, Error)]
pub enum AdminClientError {
    #[error("invalid admin URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("admin request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("admin token rejected by {url}")]
    Unauthorized { url: String },
    #[error("server answered {status}: {body}")]
    Server { status: StatusCode, body: String },
    #[error("failed to parse admin response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for the cache maintenance routes of a running server.
#[derive(Clone, Debug)]
pub struct AdminClient {
    client: Client,
    base: Url,
    token: String,
}

impl AdminClient {
    pub fn new(base: Url, token: impl Into<String>) -> Result<Self, AdminClientError> {
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            client,
            base: base.join("/")?,
            token: token.into(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("sitemill/", env!("CARGO_PKG_VERSION"))
    }

    pub async fn invalidate(
        &self,
        sitemap: Option<&str>,
    ) -> Result<InvalidationReport, AdminClientError> {
        self.post(INVALIDATE_PATH, sitemap).await
    }

    pub async fn warmup(&self, sitemap: Option<&str>) -> Result<WarmupSummary, AdminClientError> {
        self.post(WARMUP_PATH, sitemap).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        sitemap: Option<&str>,
    ) -> Result<T, AdminClientError> {
        let url = self.base.join(path)?;
        let body = CacheTarget {
            sitemap: sitemap.map(str::to_string),
        };

        let response = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(AdminClientError::Unauthorized {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(AdminClientError::Server {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
