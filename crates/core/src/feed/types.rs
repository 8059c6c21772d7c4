//! Types for feed access.

use async_trait::async_trait;
use thiserror::Error;

use crate::repository::ItemMeta;

/// Errors that can occur while reading the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to parse torrent: {0}")]
    Parse(String),
}

impl FeedError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Request(e.to_string())
        }
    }
}

/// A torrent found at a feed offset.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    /// Slot the item was read from.
    pub offset: u64,
    /// Torrent display name.
    pub name: String,
    /// Sum of all payload file lengths in bytes.
    pub total_size: u64,
    /// Payload paths relative to the download directory, each starting with '/'.
    pub files: Vec<String>,
    /// Lowercase hex info hash.
    pub info_hash: String,
    /// The raw .torrent bytes, forwarded to the download backend.
    pub raw: Vec<u8>,
}

/// Result of looking at a single feed offset.
#[derive(Debug, Clone)]
pub enum FeedFetch {
    Found(ParsedItem),
    /// Nothing (or nothing torrent-shaped) lives at this offset.
    NotFound,
}

/// Source of torrents addressed by a monotonically increasing offset.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, offset: u64) -> Result<FeedFetch, FeedError>;
}

/// Source of descriptive metadata for the item at an offset.
#[async_trait]
pub trait MetaSource: Send + Sync {
    async fn fetch_meta(&self, offset: u64) -> Result<ItemMeta, FeedError>;
}
