//! Mock feed for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::feed::{parse_feed_item, FeedClient, FeedError, FeedFetch, MetaSource};
use crate::repository::ItemMeta;

#[derive(Debug, Clone)]
enum Slot {
    Torrent(Vec<u8>),
    Failure(String),
}

/// Mock implementation of both [`FeedClient`] and [`MetaSource`].
///
/// Offsets without a configured slot are empty; offsets without configured
/// metadata return an empty map.
#[derive(Debug, Default)]
pub struct MockFeed {
    slots: RwLock<HashMap<u64, Slot>>,
    meta: RwLock<HashMap<u64, ItemMeta>>,
    fetches: RwLock<Vec<u64>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these .torrent bytes at `offset`.
    pub async fn set_torrent(&self, offset: u64, bytes: Vec<u8>) {
        self.slots.write().await.insert(offset, Slot::Torrent(bytes));
    }

    /// Fail fetches of `offset` with a request error.
    pub async fn set_failure(&self, offset: u64, message: &str) {
        self.slots
            .write()
            .await
            .insert(offset, Slot::Failure(message.to_string()));
    }

    /// Make `offset` empty again.
    pub async fn clear(&self, offset: u64) {
        self.slots.write().await.remove(&offset);
    }

    pub async fn set_meta(&self, offset: u64, meta: ItemMeta) {
        self.meta.write().await.insert(offset, meta);
    }

    /// Offsets fetched so far, in call order.
    pub async fn fetched(&self) -> Vec<u64> {
        self.fetches.read().await.clone()
    }
}

#[async_trait]
impl FeedClient for MockFeed {
    async fn fetch(&self, offset: u64) -> Result<FeedFetch, FeedError> {
        self.fetches.write().await.push(offset);
        match self.slots.read().await.get(&offset) {
            None => Ok(FeedFetch::NotFound),
            Some(Slot::Failure(message)) => Err(FeedError::Request(message.clone())),
            Some(Slot::Torrent(bytes)) => parse_feed_item(offset, bytes).map(FeedFetch::Found),
        }
    }
}

#[async_trait]
impl MetaSource for MockFeed {
    async fn fetch_meta(&self, offset: u64) -> Result<ItemMeta, FeedError> {
        Ok(self
            .meta
            .read()
            .await
            .get(&offset)
            .cloned()
            .unwrap_or_default())
    }
}
