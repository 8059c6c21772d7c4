//! Offset crawler.
//!
//! Walks the feed a batch of offsets at a time, admits new torrents into the
//! repository and advances the persisted crawl offset over the leading run of
//! slots that were fully examined.

mod admission;

pub use admission::{Admission, AdmissionFilter};

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::feed::{FeedClient, FeedError, FeedFetch, MetaSource, ParsedItem};
use crate::metrics;
use crate::repository::{ItemMeta, ItemRepository, RepositoryError};

/// Errors that abort a crawl operation.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of one crawl cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub start: u64,
    /// Offset persisted for the next cycle. Never below `start`.
    pub next_offset: u64,
    /// Newly admitted items in offset order.
    pub accepted: Vec<ParsedItem>,
}

/// Replace stored metadata only with a non-empty set at least as large.
pub fn should_replace_meta(stored: &ItemMeta, fresh: &ItemMeta) -> bool {
    !fresh.is_empty() && fresh.len() >= stored.len()
}

pub struct OffsetCrawler {
    feed: Arc<dyn FeedClient>,
    meta: Option<Arc<dyn MetaSource>>,
    repository: Arc<dyn ItemRepository>,
    filter: AdmissionFilter,
    skip_failed_offsets: bool,
}

impl OffsetCrawler {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        repository: Arc<dyn ItemRepository>,
        filter: AdmissionFilter,
    ) -> Self {
        Self {
            feed,
            meta: None,
            repository,
            filter,
            skip_failed_offsets: false,
        }
    }

    pub fn with_meta_source(mut self, meta: Arc<dyn MetaSource>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Treat failed fetches as scanned so one broken slot cannot stall the walk.
    pub fn with_skip_failed_offsets(mut self, skip: bool) -> Self {
        self.skip_failed_offsets = skip;
        self
    }

    /// Examine `[start, start + batch)` and persist the next offset.
    ///
    /// Slots are fetched concurrently and handled in ascending order. The
    /// persisted offset moves past the leading run of scanned slots only, so
    /// a failed slot is retried next cycle. Only a failure to persist the
    /// offset itself is returned as an error.
    pub async fn run_cycle(&self, start: u64, batch: u64) -> Result<CycleOutcome, CrawlError> {
        let offsets: Vec<u64> = (start..start.saturating_add(batch)).collect();
        let fetches = join_all(offsets.iter().map(|&offset| self.feed.fetch(offset))).await;

        let mut accepted = Vec::new();
        let mut advance = 0u64;
        let mut contiguous = true;

        for (offset, fetched) in offsets.into_iter().zip(fetches) {
            let scanned = match fetched {
                Ok(FeedFetch::NotFound) => {
                    debug!(offset, "Empty feed slot");
                    true
                }
                Ok(FeedFetch::Found(item)) => match self.admit(item).await {
                    Ok(Some(item)) => {
                        accepted.push(item);
                        true
                    }
                    Ok(None) => true,
                    Err(e) => {
                        error!(offset, error = %e, "Failed to store feed item");
                        false
                    }
                },
                Err(e) => {
                    metrics::FEED_ERRORS.inc();
                    warn!(offset, error = %e, "Failed to fetch feed slot");
                    self.skip_failed_offsets
                }
            };

            if scanned {
                metrics::OFFSETS_SCANNED.inc();
            }
            if scanned && contiguous {
                advance += 1;
            } else {
                contiguous = false;
            }
        }

        let next_offset = start + advance;
        self.repository.set_crawl_offset(next_offset)?;
        metrics::CRAWL_OFFSET.set(next_offset as i64);

        info!(
            start,
            next_offset,
            accepted = accepted.len(),
            "Crawl cycle finished"
        );

        Ok(CycleOutcome {
            start,
            next_offset,
            accepted,
        })
    }

    /// Check a single offset, bypassing dedup and the ignore pattern.
    ///
    /// The item is stored (idempotently) and returned for dispatch. The
    /// crawl offset is left untouched.
    pub async fn force_check(&self, offset: u64) -> Result<Option<ParsedItem>, CrawlError> {
        match self.feed.fetch(offset).await? {
            FeedFetch::NotFound => {
                info!(offset, "Forced check found nothing");
                Ok(None)
            }
            FeedFetch::Found(item) if item.total_size == 0 => {
                warn!(offset, name = %item.name, "Forced check found an empty torrent");
                Ok(None)
            }
            FeedFetch::Found(item) => {
                self.persist(&item).await?;
                info!(offset, name = %item.name, "Forced check stored item");
                Ok(Some(item))
            }
        }
    }

    async fn admit(&self, item: ParsedItem) -> Result<Option<ParsedItem>, RepositoryError> {
        if item.total_size == 0 {
            error!(offset = item.offset, name = %item.name, "Zero torrent size");
            metrics::ITEMS_ADMITTED.with_label_values(&["empty"]).inc();
            return Ok(None);
        }

        match self.filter.evaluate(self.repository.as_ref(), &item.name)? {
            Admission::Duplicate(id) => {
                debug!(offset = item.offset, name = %item.name, id, "Already known");
                metrics::ITEMS_ADMITTED
                    .with_label_values(&["duplicate"])
                    .inc();
                Ok(None)
            }
            Admission::Ignored => {
                info!(offset = item.offset, name = %item.name, "Torrent ignored");
                metrics::ITEMS_ADMITTED.with_label_values(&["ignored"]).inc();
                Ok(None)
            }
            Admission::Accept => {
                let id = self.persist(&item).await?;
                info!(
                    offset = item.offset,
                    name = %item.name,
                    id,
                    size = item.total_size,
                    files = item.files.len(),
                    "New torrent"
                );
                metrics::ITEMS_ADMITTED.with_label_values(&["accepted"]).inc();
                Ok(Some(item))
            }
        }
    }

    async fn persist(&self, item: &ParsedItem) -> Result<i64, RepositoryError> {
        let id = self
            .repository
            .add_item(&item.name, item.offset, &item.files)?;
        self.refresh_meta(id, item.offset).await;
        Ok(id)
    }

    /// Metadata failures never reject an item.
    async fn refresh_meta(&self, item_id: i64, offset: u64) {
        let Some(source) = &self.meta else {
            return;
        };

        let fresh = match source.fetch_meta(offset).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(offset, item_id, error = %e, "Failed to fetch item metadata");
                return;
            }
        };

        match self.repository.item_meta(item_id) {
            Ok(stored) if should_replace_meta(&stored, &fresh) => {
                debug!(item_id, keys = fresh.len(), "Writing item metadata");
                if let Err(e) = self.repository.set_item_meta(item_id, &fresh) {
                    warn!(item_id, error = %e, "Failed to store item metadata");
                }
            }
            Ok(stored) => {
                debug!(
                    item_id,
                    stored = stored.len(),
                    fresh = fresh.len(),
                    "Keeping stored metadata"
                );
            }
            Err(e) => warn!(item_id, error = %e, "Failed to read item metadata"),
        }
    }
}
