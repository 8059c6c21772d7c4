//! Hands newly accepted items to the torrent client.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::feed::ParsedItem;
use crate::metrics;
use crate::torrent_client::{AddTorrentRequest, TorrentClient};

/// What a dispatch round did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Stale jobs removed before submission.
    pub removed: Vec<String>,
    /// Backend ids of freshly submitted jobs.
    pub submitted: Vec<String>,
    /// Names of items the backend refused.
    pub failed: Vec<String>,
}

pub struct DownloadDispatcher {
    client: Arc<dyn TorrentClient>,
    download_dir: String,
    trackers: Vec<String>,
}

impl DownloadDispatcher {
    pub fn new(client: Arc<dyn TorrentClient>, download_dir: impl Into<String>) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
            trackers: Vec::new(),
        }
    }

    pub fn with_trackers(mut self, trackers: Vec<String>) -> Self {
        self.trackers = trackers;
        self
    }

    /// Replace same-named jobs with fresh submissions of `items`.
    ///
    /// Failures are logged per step; no single failure aborts the round.
    pub async fn reconcile_and_submit(&self, items: &[ParsedItem]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if items.is_empty() {
            return report;
        }

        let names: HashSet<&str> = items.iter().map(|i| i.name.as_str()).collect();
        match self.client.list_active().await {
            Ok(active) => {
                let stale: Vec<String> = active
                    .into_iter()
                    .filter(|t| names.contains(t.name.as_str()))
                    .map(|t| t.id)
                    .collect();
                if !stale.is_empty() {
                    match self.client.remove(&stale, false).await {
                        Ok(()) => {
                            debug!(ids = ?stale, "Removed stale torrents");
                            metrics::DOWNLOADS
                                .with_label_values(&["removed"])
                                .inc_by(stale.len() as u64);
                            report.removed = stale;
                        }
                        Err(e) => warn!(error = %e, "Failed to remove stale torrents"),
                    }
                }
            }
            Err(e) => warn!(
                client = self.client.name(),
                error = %e,
                "Failed to list active torrents"
            ),
        }

        for item in items {
            let request =
                AddTorrentRequest::new(item.raw.clone(), item.name.clone(), &self.download_dir)
                    .with_info_hash(item.info_hash.clone());
            match self.client.submit(request).await {
                Ok(result) => {
                    info!(name = %item.name, id = %result.id, "Torrent submitted");
                    metrics::DOWNLOADS.with_label_values(&["submitted"]).inc();
                    report.submitted.push(result.id);
                }
                Err(e) => {
                    error!(name = %item.name, error = %e, "Failed to submit torrent");
                    metrics::DOWNLOADS.with_label_values(&["failed"]).inc();
                    report.failed.push(item.name.clone());
                }
            }
        }

        if !self.trackers.is_empty() && !report.submitted.is_empty() {
            if let Err(e) = self
                .client
                .attach_trackers(&report.submitted, &self.trackers)
                .await
            {
                warn!(error = %e, "Failed to attach trackers");
            }
        }

        report
    }
}
