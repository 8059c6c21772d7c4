//! Torrent client abstraction.
//!
//! This module provides a `TorrentClient` trait for handing torrents to a
//! download daemon (Transmission or qBittorrent).

mod qbittorrent;
mod transmission;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use transmission::TransmissionClient;
pub use types::*;

use std::sync::Arc;

use crate::config::{DownloadBackendKind, DownloadConfig};

/// Build the configured torrent client, or `None` when its section is missing.
pub fn create_torrent_client(config: &DownloadConfig) -> Option<Arc<dyn TorrentClient>> {
    match config.backend {
        DownloadBackendKind::Transmission => config
            .transmission
            .clone()
            .map(|c| Arc::new(TransmissionClient::new(c)) as Arc<dyn TorrentClient>),
        DownloadBackendKind::QBittorrent => config
            .qbittorrent
            .clone()
            .map(|c| Arc::new(QBittorrentClient::new(c)) as Arc<dyn TorrentClient>),
    }
}
