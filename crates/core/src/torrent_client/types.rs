//! Types for torrent client operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during torrent client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

impl TorrentClientError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TorrentClientError::Timeout
        } else if e.is_connect() {
            TorrentClientError::ConnectionFailed(e.to_string())
        } else {
            TorrentClientError::ApiError(e.to_string())
        }
    }
}

/// A job currently known to the torrent client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTorrent {
    /// Backend handle (lowercase info hash for every supported backend).
    pub id: String,
    pub name: String,
}

/// Request to add a new torrent from its .torrent contents.
#[derive(Debug, Clone)]
pub struct AddTorrentRequest {
    /// Raw .torrent file bytes.
    pub data: Vec<u8>,
    /// Torrent name (for logging and file naming).
    pub name: String,
    /// Lowercase hex info hash, when known.
    pub info_hash: Option<String>,
    /// Directory the payload is written to.
    pub download_dir: String,
    /// Start paused.
    pub paused: bool,
}

impl AddTorrentRequest {
    pub fn new(data: Vec<u8>, name: impl Into<String>, download_dir: impl Into<String>) -> Self {
        Self {
            data,
            name: name.into(),
            info_hash: None,
            download_dir: download_dir.into(),
            paused: false,
        }
    }

    pub fn with_info_hash(mut self, hash: impl Into<String>) -> Self {
        self.info_hash = Some(hash.into());
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }
}

/// Result of adding a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTorrentResult {
    /// Backend handle for follow-up calls.
    pub id: String,
    /// Name reported by the backend, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Operations the download dispatcher needs from a torrent client.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// List every job the client currently holds.
    async fn list_active(&self) -> Result<Vec<ActiveTorrent>, TorrentClientError>;

    /// Remove jobs. Downloaded data is kept unless `delete_data` is set.
    async fn remove(&self, ids: &[String], delete_data: bool) -> Result<(), TorrentClientError>;

    /// Submit a torrent for download.
    async fn submit(&self, request: AddTorrentRequest)
        -> Result<AddTorrentResult, TorrentClientError>;

    /// Add announce URLs to existing jobs.
    async fn attach_trackers(
        &self,
        ids: &[String],
        trackers: &[String],
    ) -> Result<(), TorrentClientError>;
}
