//! Metadata scraping from item pages.

use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::Client;
use tracing::debug;

use super::http::expand_url;
use super::{FeedError, MetaSource};
use crate::config::{MetaConfig, MetaRule};
use crate::repository::ItemMeta;

/// Applies named regex rules to a page; each rule keeps its first capture group.
#[derive(Debug, Clone)]
pub struct MetaExtractor {
    rules: Vec<(String, Regex)>,
}

impl MetaExtractor {
    /// Compile extraction rules. Fails on the first invalid pattern.
    pub fn new(rules: &[MetaRule]) -> Result<Self, regex_lite::Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.name.clone(), Regex::new(&rule.pattern)?)))
            .collect::<Result<Vec<_>, regex_lite::Error>>()?;
        Ok(Self { rules })
    }

    /// Extract values from `page`. Rules that do not match are omitted.
    /// Values are trimmed and HTML-escaped.
    pub fn extract(&self, page: &str) -> ItemMeta {
        let mut meta = ItemMeta::new();
        for (name, regex) in &self.rules {
            let value = regex
                .captures(page)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty());
            if let Some(value) = value {
                meta.insert(name.clone(), escape_html(value));
            }
        }
        meta
    }
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Fetches the item page over HTTP and runs a [`MetaExtractor`] on it.
pub struct HttpMetaSource {
    client: Client,
    base_url: String,
    page_url: String,
    extractor: MetaExtractor,
}

impl HttpMetaSource {
    pub fn new(base_url: impl Into<String>, config: &MetaConfig) -> Result<Self, regex_lite::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            base_url: base_url.into(),
            page_url: config.page_url.clone(),
            extractor: MetaExtractor::new(&config.rules)?,
        })
    }
}

#[async_trait]
impl MetaSource for HttpMetaSource {
    async fn fetch_meta(&self, offset: u64) -> Result<ItemMeta, FeedError> {
        let url = expand_url(&self.base_url, &self.page_url, offset);
        debug!(offset, url = %url, "Fetching item page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let page = response.text().await.map_err(FeedError::from_reqwest)?;
        Ok(self.extractor.extract(&page))
    }
}
