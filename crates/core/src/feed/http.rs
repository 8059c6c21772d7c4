//! HTTP feed client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::parser::{looks_bencoded, parse_feed_item};
use super::{FeedClient, FeedError, FeedFetch};

const FEED_TIMEOUT_SECS: u64 = 30;

/// Reads torrents from `<base_url><context_url>` with `{offset}` substituted.
pub struct HttpFeedClient {
    client: Client,
    base_url: String,
    context_url: String,
}

impl HttpFeedClient {
    pub fn new(base_url: impl Into<String>, context_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(FEED_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            context_url: context_url.into(),
        }
    }

    /// Full URL of the torrent at `offset`.
    pub fn url_for(&self, offset: u64) -> String {
        expand_url(&self.base_url, &self.context_url, offset)
    }
}

/// Join a base URL and an `{offset}` template.
pub(crate) fn expand_url(base_url: &str, template: &str, offset: u64) -> String {
    format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        template.replace("{offset}", &offset.to_string())
    )
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, offset: u64) -> Result<FeedFetch, FeedError> {
        let url = self.url_for(offset);
        debug!(offset, url = %url, "Fetching feed slot");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(FeedFetch::NotFound);
        }
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(FeedError::from_reqwest)?;
        if body.is_empty() {
            debug!(offset, "Slot is empty");
            return Ok(FeedFetch::NotFound);
        }
        // Rate-limit and login pages come back as 200 HTML.
        if !looks_bencoded(&body) {
            return Err(FeedError::Parse(format!(
                "slot {} returned a non-torrent body",
                offset
            )));
        }

        parse_feed_item(offset, &body).map(FeedFetch::Found)
    }
}
