//! Transmission RPC client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::TransmissionConfig;

use super::{
    ActiveTorrent, AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Transmission client speaking the JSON RPC protocol.
pub struct TransmissionClient {
    client: Client,
    config: TransmissionConfig,
    /// CSRF session id handed out by the daemon (refreshed on 409).
    session: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct RpcTorrent {
    #[serde(rename = "hashString")]
    hash_string: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TorrentGetArguments {
    #[serde(default)]
    torrents: Vec<RpcTorrent>,
}

#[derive(Debug, Deserialize)]
struct TorrentAddArguments {
    #[serde(rename = "torrent-added")]
    added: Option<RpcTorrent>,
    #[serde(rename = "torrent-duplicate")]
    duplicate: Option<RpcTorrent>,
}

impl TransmissionClient {
    pub fn new(config: TransmissionConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        }
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, TorrentClientError> {
        let mut request = self.client.post(&self.config.url).json(body);
        if !self.config.username.is_empty() {
            request = request.basic_auth(&self.config.username, Some(&self.config.password));
        }
        if let Some(session) = self.session.read().await.as_ref() {
            request = request.header(SESSION_HEADER, session);
        }
        request
            .send()
            .await
            .map_err(TorrentClientError::from_reqwest)
    }

    /// Call an RPC method, performing the session id handshake when asked to.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value, TorrentClientError> {
        let body = json!({ "method": method, "arguments": arguments });

        let mut response = self.send(&body).await?;
        if response.status() == StatusCode::CONFLICT {
            let session = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    TorrentClientError::ApiError("409 without session id".to_string())
                })?;
            debug!("Transmission session id refreshed");
            *self.session.write().await = Some(session);
            response = self.send(&body).await?;
        }

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(TorrentClientError::AuthenticationFailed(
                    "Invalid credentials".to_string(),
                ))
            }
            status if !status.is_success() => {
                return Err(TorrentClientError::ApiError(format!("HTTP {}", status)))
            }
            _ => {}
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        if rpc.result != "success" {
            return Err(TorrentClientError::ApiError(rpc.result));
        }
        Ok(rpc.arguments)
    }
}

#[async_trait]
impl TorrentClient for TransmissionClient {
    fn name(&self) -> &str {
        "transmission"
    }

    async fn list_active(&self) -> Result<Vec<ActiveTorrent>, TorrentClientError> {
        let arguments = self
            .call(
                "torrent-get",
                json!({ "fields": ["id", "name", "hashString"] }),
            )
            .await?;
        let parsed: TorrentGetArguments = serde_json::from_value(arguments)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .torrents
            .into_iter()
            .map(|t| ActiveTorrent {
                id: t.hash_string.to_lowercase(),
                name: t.name,
            })
            .collect())
    }

    async fn remove(&self, ids: &[String], delete_data: bool) -> Result<(), TorrentClientError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call(
            "torrent-remove",
            json!({ "ids": ids, "delete-local-data": delete_data }),
        )
        .await?;
        Ok(())
    }

    async fn submit(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        if request.data.is_empty() {
            return Err(TorrentClientError::InvalidTorrent(
                "empty torrent data".to_string(),
            ));
        }

        let arguments = self
            .call(
                "torrent-add",
                json!({
                    "metainfo": general_purpose::STANDARD.encode(&request.data),
                    "download-dir": request.download_dir,
                    "paused": request.paused,
                }),
            )
            .await?;
        let parsed: TorrentAddArguments = serde_json::from_value(arguments)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        let torrent = match (parsed.added, parsed.duplicate) {
            (Some(added), _) => added,
            (None, Some(duplicate)) => {
                warn!(name = %request.name, "Transmission already had this torrent");
                duplicate
            }
            (None, None) => {
                return Err(TorrentClientError::ApiError(
                    "torrent-add returned no torrent".to_string(),
                ))
            }
        };

        Ok(AddTorrentResult {
            id: torrent.hash_string.to_lowercase(),
            name: Some(torrent.name),
        })
    }

    async fn attach_trackers(
        &self,
        ids: &[String],
        trackers: &[String],
    ) -> Result<(), TorrentClientError> {
        if ids.is_empty() || trackers.is_empty() {
            return Ok(());
        }
        self.call("torrent-set", json!({ "ids": ids, "trackerAdd": trackers }))
            .await?;
        Ok(())
    }
}
