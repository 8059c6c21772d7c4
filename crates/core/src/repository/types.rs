//! Types for item persistence.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown file status code: {0}")]
    InvalidStatus(i64),
}

/// Conversion lifecycle of a single payload file.
///
/// Persisted as a small integer, see [`FileStatus::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Waiting for the payload to appear on disk.
    Pending,
    /// Uploaded, the transcoder is still working on it.
    Converting,
    /// Delivered (or marked as such by an operator).
    Ready,
    /// Upload failed; needs operator attention.
    Error,
}

impl FileStatus {
    pub fn code(self) -> i64 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Converting => 1,
            FileStatus::Ready => 2,
            FileStatus::Error => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, RepositoryError> {
        match code {
            0 => Ok(FileStatus::Pending),
            1 => Ok(FileStatus::Converting),
            2 => Ok(FileStatus::Ready),
            3 => Ok(FileStatus::Error),
            other => Err(RepositoryError::InvalidStatus(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Converting => "converting",
            FileStatus::Ready => "ready",
            FileStatus::Error => "error",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered feed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    /// Unique display name; the dedup key.
    pub name: String,
    /// Feed offset the item was first seen at.
    pub offset: u64,
    pub created_at: DateTime<Utc>,
}

/// A payload file belonging to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFile {
    pub id: i64,
    pub item_id: i64,
    /// Path relative to the download directory, always starting with '/'.
    pub name: String,
    pub status: FileStatus,
    /// Transcoder entry id, set once the upload was accepted.
    pub entry_id: Option<String>,
}

/// Scraped key/value metadata of an item.
pub type ItemMeta = BTreeMap<String, String>;

/// Persistence for items, files, subscriber sets and crawl progress.
///
/// All mutators are idempotent "set" operations so concurrent callers
/// (background loop and operator commands) can interleave freely.
pub trait ItemRepository: Send + Sync {
    /// Next offset to examine. Zero when never set.
    fn crawl_offset(&self) -> Result<u64, RepositoryError>;

    fn set_crawl_offset(&self, offset: u64) -> Result<(), RepositoryError>;

    fn find_item_by_name(&self, name: &str) -> Result<Option<Item>, RepositoryError>;

    fn get_item(&self, id: i64) -> Result<Option<Item>, RepositoryError>;

    /// Insert an item and its files, returning the item id.
    ///
    /// Re-adding an existing name returns the existing id and only inserts
    /// file names not yet known.
    fn add_item(&self, name: &str, offset: u64, files: &[String]) -> Result<i64, RepositoryError>;

    fn item_files(&self, item_id: i64) -> Result<Vec<ItemFile>, RepositoryError>;

    fn item_meta(&self, item_id: i64) -> Result<ItemMeta, RepositoryError>;

    /// Replace the stored metadata with `meta`.
    fn set_item_meta(&self, item_id: i64, meta: &ItemMeta) -> Result<(), RepositoryError>;

    /// Every file whose status is not Ready, ordered by id.
    fn files_not_ready(&self) -> Result<Vec<ItemFile>, RepositoryError>;

    fn get_file(&self, id: i64) -> Result<Option<ItemFile>, RepositoryError>;

    fn set_file_status(&self, id: i64, status: FileStatus) -> Result<(), RepositoryError>;

    fn set_file_entry_id(&self, id: i64, entry_id: &str) -> Result<(), RepositoryError>;

    /// 1-based position of the file within its item, ordered by name.
    fn file_ordinal(&self, id: i64) -> Result<Option<u32>, RepositoryError>;

    fn add_admin(&self, chat: i64) -> Result<(), RepositoryError>;
    fn remove_admin(&self, chat: i64) -> Result<(), RepositoryError>;
    fn is_admin(&self, chat: i64) -> Result<bool, RepositoryError>;
    fn admins(&self) -> Result<Vec<i64>, RepositoryError>;

    fn add_chat(&self, chat: i64) -> Result<(), RepositoryError>;
    fn remove_chat(&self, chat: i64) -> Result<(), RepositoryError>;
    fn is_chat(&self, chat: i64) -> Result<bool, RepositoryError>;
    fn chats(&self) -> Result<Vec<i64>, RepositoryError>;
}
