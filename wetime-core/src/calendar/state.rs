//! Remote feed state for EXTERNAL calendars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{WeTimeError, WeTimeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    pub url: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Caching validator (ETag) from the last successful fetch
    pub etag: Option<String>,
}

impl FeedState {
    pub fn new(url: &str) -> WeTimeResult<Self> {
        // webcal:// is an alias for https://
        let normalized = normalize_feed_url(url);
        Url::parse(&normalized)
            .map_err(|e| WeTimeError::Invalid(format!("invalid feed URL '{}': {}", url, e)))?;

        Ok(FeedState {
            url: url.to_string(),
            last_fetched_at: None,
            etag: None,
        })
    }

    /// URL to actually request.
    pub fn fetch_url(&self) -> String {
        normalize_feed_url(&self.url)
    }

    /// Record a completed fetch. A `None` validator keeps the previous one.
    pub fn mark_fetched(&mut self, at: DateTime<Utc>, etag: Option<String>) {
        self.last_fetched_at = Some(at);
        if etag.is_some() {
            self.etag = etag;
        }
    }
}

fn normalize_feed_url(url: &str) -> String {
    match url.trim().strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => url.trim().to_string(),
    }
}
