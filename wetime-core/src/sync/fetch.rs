//! Feed fetching over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH, USER_AGENT};

use crate::error::{WeTimeError, WeTimeResult};

/// What a conditional fetch returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server answered 304 to our validator
    NotModified,
    Fetched { body: String, etag: Option<String> },
}

/// Source of feed text. Implementations must enforce their own timeout.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch `url`, sending `etag` as `If-None-Match` when present.
    /// Transport failures and non-success statuses are [`WeTimeError::FeedFetch`].
    async fn fetch(&self, url: &str, etag: Option<&str>) -> WeTimeResult<FetchOutcome>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> WeTimeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeTimeError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpFeedFetcher { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str, etag: Option<&str>) -> WeTimeResult<FetchOutcome> {
        let fetch_error = |reason: String| WeTimeError::FeedFetch {
            calendar: url.to_string(),
            reason,
        };

        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("wetime/", env!("CARGO_PKG_VERSION")));
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(url, "Feed not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(format!("Failed to read body: {}", e)))?;

        tracing::debug!(url, bytes = body.len(), "Fetched feed");

        Ok(FetchOutcome::Fetched { body, etag })
    }
}
