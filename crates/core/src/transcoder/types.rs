//! Types for transcoding service operations.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the transcoding service.
#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("service error {code}: {message}")]
    Api { code: String, message: String },

    #[error("no open session")]
    NoSession,

    #[error("failed to read upload: {0}")]
    Io(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl TranscoderError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscoderError::Timeout
        } else {
            TranscoderError::Request(e.to_string())
        }
    }
}

/// Processing state of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Content not received yet.
    NoContent,
    /// Importing or converting.
    Processing,
    Ready,
    Failed,
    /// Any status the service reports that we do not model.
    Other,
}

impl EntryStatus {
    /// Map Kaltura entry status codes.
    pub fn from_kaltura(code: i64) -> Self {
        match code {
            2 => EntryStatus::Ready,
            0 | 1 | 4 => EntryStatus::Processing,
            7 => EntryStatus::NoContent,
            -1 | -2 => EntryStatus::Failed,
            _ => EntryStatus::Other,
        }
    }
}

/// A media entry as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub status: EntryStatus,
    /// Download URL of the converted media (may be empty before ready).
    pub download_url: String,
    pub thumbnail_url: String,
}

/// One converted rendition of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    /// Size in kilobytes.
    pub size_kb: u64,
    /// File extension (e.g., "mp4").
    pub file_ext: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub container_format: String,
}

impl Variant {
    pub fn size_bytes(&self) -> u64 {
        self.size_kb.saturating_mul(1024)
    }

    pub fn mime_type(&self) -> String {
        format!("video/{}", self.file_ext)
    }
}

/// A remote transcoding service.
///
/// Calls other than `start_session` require an open session.
#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    /// Open a session, replacing any session still open.
    async fn start_session(&self) -> Result<(), TranscoderError>;

    /// Close the current session. Closing without a session is a no-op.
    async fn end_session(&self) -> Result<(), TranscoderError>;

    /// Create an empty video entry and return its id.
    async fn create_entry(&self, name: &str, tags: &[String]) -> Result<String, TranscoderError>;

    /// Upload the local file as the entry's source content.
    async fn upload_content(&self, entry_id: &str, path: &Path) -> Result<(), TranscoderError>;

    async fn get_entry(&self, entry_id: &str) -> Result<RemoteEntry, TranscoderError>;

    /// Converted renditions of the entry, in service order.
    async fn list_variants(&self, entry_id: &str) -> Result<Vec<Variant>, TranscoderError>;
}
