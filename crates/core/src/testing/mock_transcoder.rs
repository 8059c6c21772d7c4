//! Mock transcoder for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::transcoder::{EntryStatus, RemoteEntry, Transcoder, TranscoderError, Variant};

#[derive(Debug, Default)]
struct State {
    open_sessions: i64,
    fail_sessions: bool,
    fail_uploads: bool,
    next_entry: u32,
    created: Vec<(String, Vec<String>)>,
    uploads: Vec<(String, PathBuf)>,
    entries: HashMap<String, RemoteEntry>,
    variants: HashMap<String, Vec<Variant>>,
}

/// Mock implementation of the Transcoder trait.
///
/// Created entries start out Processing with no variants; tests move them
/// along with [`MockTranscoder::set_entry`] and [`MockTranscoder::set_variants`].
#[derive(Debug, Default)]
pub struct MockTranscoder {
    state: RwLock<State>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A variant with the given extension and size, 640x360.
    pub fn variant(file_ext: &str, size_kb: u64) -> Variant {
        Variant {
            id: format!("flavor-{}", file_ext),
            size_kb,
            file_ext: file_ext.to_string(),
            width: 640,
            height: 360,
            bitrate: 800,
            container_format: "isom".to_string(),
        }
    }

    pub async fn set_entry(&self, entry_id: &str, status: EntryStatus, download_url: &str) {
        self.state.write().await.entries.insert(
            entry_id.to_string(),
            RemoteEntry {
                id: entry_id.to_string(),
                status,
                download_url: download_url.to_string(),
                thumbnail_url: String::new(),
            },
        );
    }

    pub async fn set_variants(&self, entry_id: &str, variants: Vec<Variant>) {
        self.state
            .write()
            .await
            .variants
            .insert(entry_id.to_string(), variants);
    }

    /// Make `start_session` fail.
    pub async fn fail_sessions(&self, fail: bool) {
        self.state.write().await.fail_sessions = fail;
    }

    /// Make `upload_content` fail.
    pub async fn fail_uploads(&self, fail: bool) {
        self.state.write().await.fail_uploads = fail;
    }

    /// Recorded `create_entry(name, tags)` calls.
    pub async fn created(&self) -> Vec<(String, Vec<String>)> {
        self.state.read().await.created.clone()
    }

    /// Recorded `(entry id, path)` uploads.
    pub async fn uploads(&self) -> Vec<(String, PathBuf)> {
        self.state.read().await.uploads.clone()
    }

    /// Sessions opened and not yet closed.
    pub async fn session_count(&self) -> i64 {
        self.state.read().await.open_sessions
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_session(&self) -> Result<(), TranscoderError> {
        let mut state = self.state.write().await;
        if state.fail_sessions {
            return Err(TranscoderError::Api {
                code: "INVALID_KS".to_string(),
                message: "session refused".to_string(),
            });
        }
        state.open_sessions += 1;
        Ok(())
    }

    async fn end_session(&self) -> Result<(), TranscoderError> {
        let mut state = self.state.write().await;
        state.open_sessions = (state.open_sessions - 1).max(0);
        Ok(())
    }

    async fn create_entry(&self, name: &str, tags: &[String]) -> Result<String, TranscoderError> {
        let mut state = self.state.write().await;
        state.next_entry += 1;
        let id = format!("0_mock{:04}", state.next_entry);
        state.created.push((name.to_string(), tags.to_vec()));
        state.entries.insert(
            id.clone(),
            RemoteEntry {
                id: id.clone(),
                status: EntryStatus::NoContent,
                download_url: String::new(),
                thumbnail_url: String::new(),
            },
        );
        Ok(id)
    }

    async fn upload_content(&self, entry_id: &str, path: &Path) -> Result<(), TranscoderError> {
        let mut state = self.state.write().await;
        if state.fail_uploads {
            return Err(TranscoderError::Request("upload refused".to_string()));
        }
        let entry = state
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| TranscoderError::Api {
                code: "ENTRY_ID_NOT_FOUND".to_string(),
                message: entry_id.to_string(),
            })?;
        entry.status = EntryStatus::Processing;
        state
            .uploads
            .push((entry_id.to_string(), path.to_path_buf()));
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> Result<RemoteEntry, TranscoderError> {
        self.state
            .read()
            .await
            .entries
            .get(entry_id)
            .cloned()
            .ok_or_else(|| TranscoderError::Api {
                code: "ENTRY_ID_NOT_FOUND".to_string(),
                message: entry_id.to_string(),
            })
    }

    async fn list_variants(&self, entry_id: &str) -> Result<Vec<Variant>, TranscoderError> {
        Ok(self
            .state
            .read()
            .await
            .variants
            .get(entry_id)
            .cloned()
            .unwrap_or_default())
    }
}
