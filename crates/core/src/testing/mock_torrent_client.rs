//! Mock torrent client for testing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::torrent_client::{
    ActiveTorrent, AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
};

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - Track submissions, removals and tracker calls for assertions
/// - Pre-populate active jobs
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.add_active("abc", "movie.mp4").await;
///
/// dispatcher.reconcile_and_submit(&items).await;
///
/// assert_eq!(client.removed().await, vec![(vec!["abc".to_string()], false)]);
/// assert_eq!(client.submitted().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    active: Arc<RwLock<Vec<ActiveTorrent>>>,
    submitted: Arc<RwLock<Vec<AddTorrentRequest>>>,
    removed: Arc<RwLock<Vec<(Vec<String>, bool)>>>,
    tracker_calls: Arc<RwLock<Vec<(Vec<String>, Vec<String>)>>>,
    /// Names whose submission is refused.
    rejected: Arc<RwLock<HashSet<String>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    /// Counter for generating ids when a request carries no info hash.
    id_counter: Arc<RwLock<u32>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    pub fn new() -> Self {
        Self {
            active: Arc::new(RwLock::new(Vec::new())),
            submitted: Arc::new(RwLock::new(Vec::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
            tracker_calls: Arc::new(RwLock::new(Vec::new())),
            rejected: Arc::new(RwLock::new(HashSet::new())),
            next_error: Arc::new(RwLock::new(None)),
            id_counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Pre-populate an active job.
    pub async fn add_active(&self, id: &str, name: &str) {
        self.active.write().await.push(ActiveTorrent {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Refuse every submission of a torrent with this name.
    pub async fn reject_name(&self, name: &str) {
        self.rejected.write().await.insert(name.to_string());
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Jobs currently held.
    pub async fn active(&self) -> Vec<ActiveTorrent> {
        self.active.read().await.clone()
    }

    /// Accepted submissions, in call order.
    pub async fn submitted(&self) -> Vec<AddTorrentRequest> {
        self.submitted.read().await.clone()
    }

    /// Recorded `remove(ids, delete_data)` calls.
    pub async fn removed(&self) -> Vec<(Vec<String>, bool)> {
        self.removed.read().await.clone()
    }

    /// Recorded `attach_trackers(ids, trackers)` calls.
    pub async fn tracker_calls(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.tracker_calls.read().await.clone()
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<TorrentClientError> {
        self.next_error.write().await.take()
    }

    async fn generate_id(&self) -> String {
        let mut counter = self.id_counter.write().await;
        *counter += 1;
        format!("mockhash{:08x}", *counter)
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_active(&self) -> Result<Vec<ActiveTorrent>, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(self.active.read().await.clone())
    }

    async fn remove(&self, ids: &[String], delete_data: bool) -> Result<(), TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.removed
            .write()
            .await
            .push((ids.to_vec(), delete_data));
        self.active.write().await.retain(|t| !ids.contains(&t.id));
        Ok(())
    }

    async fn submit(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if self.rejected.read().await.contains(&request.name) {
            return Err(TorrentClientError::InvalidTorrent(format!(
                "rejected: {}",
                request.name
            )));
        }

        let id = match &request.info_hash {
            Some(hash) => hash.clone(),
            None => self.generate_id().await,
        };
        self.active.write().await.push(ActiveTorrent {
            id: id.clone(),
            name: request.name.clone(),
        });
        let name = request.name.clone();
        self.submitted.write().await.push(request);

        Ok(AddTorrentResult {
            id,
            name: Some(name),
        })
    }

    async fn attach_trackers(
        &self,
        ids: &[String],
        trackers: &[String],
    ) -> Result<(), TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.tracker_calls
            .write()
            .await
            .push((ids.to_vec(), trackers.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_uses_info_hash_as_id() {
        let client = MockTorrentClient::new();
        let result = client
            .submit(AddTorrentRequest::new(vec![1], "a", "/srv").with_info_hash("abc"))
            .await
            .unwrap();
        assert_eq!(result.id, "abc");
        assert_eq!(client.active().await.len(), 1);

        let result = client
            .submit(AddTorrentRequest::new(vec![1], "b", "/srv"))
            .await
            .unwrap();
        assert_eq!(result.id, "mockhash00000001");
    }

    #[tokio::test]
    async fn test_remove_drops_active_jobs() {
        let client = MockTorrentClient::new();
        client.add_active("x", "a").await;
        client.add_active("y", "b").await;

        client.remove(&["x".to_string()], true).await.unwrap();

        assert_eq!(client.active().await.len(), 1);
        assert_eq!(client.removed().await, vec![(vec!["x".to_string()], true)]);
    }

    #[tokio::test]
    async fn test_next_error_applies_once() {
        let client = MockTorrentClient::new();
        client
            .set_next_error(TorrentClientError::ConnectionFailed("test".into()))
            .await;

        assert!(client.list_active().await.is_err());
        assert!(client.list_active().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_name() {
        let client = MockTorrentClient::new();
        client.reject_name("bad").await;

        let result = client
            .submit(AddTorrentRequest::new(vec![1], "bad", "/srv"))
            .await;
        assert!(matches!(result, Err(TorrentClientError::InvalidTorrent(_))));
        assert!(client.submitted().await.is_empty());
    }
}
