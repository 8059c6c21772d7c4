//! qBittorrent torrent client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{
    ActiveTorrent, AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
};

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Whether the cookie jar holds a live session (cleared on 403).
    session: Arc<RwLock<Option<String>>>,
}

/// qBittorrent torrent info response (only the fields we read).
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Login and remember that the cookie jar holds a session.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint("/api/v2/auth/login"))
            .form(&params)
            .send()
            .await
            .map_err(TorrentClientError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.session.write().await = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, logging in again once if the session expired.
    ///
    /// `build` is called once per attempt because multipart bodies cannot be cloned.
    async fn execute<F>(&self, build: F) -> Result<String, TorrentClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let mut response = build(&self.client)
            .send()
            .await
            .map_err(TorrentClientError::from_reqwest)?;

        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.session.write().await = None;
            self.login().await?;
            response = build(&self.client)
                .send()
                .await
                .map_err(TorrentClientError::from_reqwest)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))
    }

    fn torrent_form(request: &AddTorrentRequest) -> Result<multipart::Form, TorrentClientError> {
        let file_part = multipart::Part::bytes(request.data.clone())
            .file_name(format!("{}.torrent", request.name))
            .mime_str("application/x-bittorrent")
            .map_err(|e| TorrentClientError::InvalidTorrent(e.to_string()))?;

        Ok(multipart::Form::new()
            .part("torrents", file_part)
            .text("savepath", request.download_dir.clone())
            .text("paused", request.paused.to_string()))
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn list_active(&self) -> Result<Vec<ActiveTorrent>, TorrentClientError> {
        let url = self.endpoint("/api/v2/torrents/info");
        let response = self.execute(|client| client.get(&url)).await?;

        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(torrents
            .into_iter()
            .map(|t| ActiveTorrent {
                id: t.hash.to_lowercase(),
                name: t.name,
            })
            .collect())
    }

    async fn remove(&self, ids: &[String], delete_data: bool) -> Result<(), TorrentClientError> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = self.endpoint("/api/v2/torrents/delete");
        let hashes = ids.join("|");
        let delete_str = if delete_data { "true" } else { "false" };

        self.execute(|client| {
            client
                .post(&url)
                .form(&[("hashes", hashes.as_str()), ("deleteFiles", delete_str)])
        })
        .await?;
        Ok(())
    }

    async fn submit(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        // The add endpoint does not echo the hash, so it must be known up front.
        let hash = request
            .info_hash
            .clone()
            .ok_or_else(|| TorrentClientError::InvalidTorrent("missing info hash".to_string()))?;

        // Validate the form once so the retry closure cannot fail.
        Self::torrent_form(&request)?;

        let url = self.endpoint("/api/v2/torrents/add");
        let body = self
            .execute(|client| match Self::torrent_form(&request) {
                Ok(form) => client.post(&url).multipart(form),
                Err(_) => client.post(&url),
            })
            .await?;

        if body.contains("Fails.") {
            return Err(TorrentClientError::InvalidTorrent(format!(
                "qBittorrent rejected {}",
                request.name
            )));
        }

        Ok(AddTorrentResult {
            id: hash.to_lowercase(),
            name: Some(request.name),
        })
    }

    async fn attach_trackers(
        &self,
        ids: &[String],
        trackers: &[String],
    ) -> Result<(), TorrentClientError> {
        if trackers.is_empty() {
            return Ok(());
        }
        let url = self.endpoint("/api/v2/torrents/addTrackers");
        let urls = trackers.join("\n");

        for hash in ids {
            self.execute(|client| {
                client
                    .post(&url)
                    .form(&[("hash", hash.as_str()), ("urls", urls.as_str())])
            })
            .await?;
        }
        Ok(())
    }
}
