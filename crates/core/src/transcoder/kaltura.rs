//! Kaltura REST (api_v3) client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{multipart, Body, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::KalturaConfig;

use super::{EntryStatus, RemoteEntry, Transcoder, TranscoderError, Variant};

const USER_SESSION_TYPE: i64 = 0;
const VIDEO_MEDIA_TYPE: i64 = 1;
const FILE_SOURCE_TYPE: &str = "1";

/// Kaltura client. Holds at most one `ks` session at a time.
pub struct KalturaClient {
    client: Client,
    config: KalturaConfig,
    session: Arc<RwLock<Option<String>>>,
}

/// Error object the API returns with HTTP 200.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KalturaError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    object_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KalturaMediaEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    download_url: String,
    #[serde(default)]
    thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KalturaFlavorAsset {
    #[serde(default)]
    id: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    file_ext: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    bitrate: u32,
    #[serde(default)]
    container_format: String,
}

#[derive(Debug, Deserialize)]
struct KalturaFlavorList {
    #[serde(default)]
    objects: Vec<KalturaFlavorAsset>,
}

/// Surface API-level errors hidden in successful HTTP responses.
fn check_api_error(body: &str) -> Result<(), TranscoderError> {
    if let Ok(err) = serde_json::from_str::<KalturaError>(body) {
        if err.object_type.contains("Exception") || !err.code.is_empty() {
            return Err(TranscoderError::Api {
                code: if err.code.is_empty() {
                    err.object_type
                } else {
                    err.code
                },
                message: err.message,
            });
        }
    }
    Ok(())
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, TranscoderError> {
    check_api_error(body)?;
    serde_json::from_str(body).map_err(|e| TranscoderError::Parse(e.to_string()))
}

impl KalturaClient {
    pub fn new(config: KalturaConfig) -> Self {
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

    fn service_url(&self, service: &str, action: &str) -> String {
        format!(
            "{}/api_v3/service/{}/action/{}",
            self.config.url.trim_end_matches('/'),
            service,
            action
        )
    }

    async fn ks(&self) -> Result<String, TranscoderError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(TranscoderError::NoSession)
    }

    async fn read_body(response: reqwest::Response) -> Result<String, TranscoderError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TranscoderError::Request(format!("HTTP {}", status)));
        }
        response.text().await.map_err(TranscoderError::from_reqwest)
    }

    /// Call an action with a JSON body inside the current session.
    async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        action: &str,
        body: Value,
    ) -> Result<T, TranscoderError> {
        let ks = self.ks().await?;
        let response = self
            .client
            .post(self.service_url(service, action))
            .query(&[("format", "1"), ("ks", ks.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(TranscoderError::from_reqwest)?;

        parse_body(&Self::read_body(response).await?)
    }
}

#[async_trait]
impl Transcoder for KalturaClient {
    fn name(&self) -> &str {
        "kaltura"
    }

    async fn start_session(&self) -> Result<(), TranscoderError> {
        if self.session.read().await.is_some() {
            if let Err(e) = self.end_session().await {
                warn!(error = %e, "Failed to close previous Kaltura session");
            }
        }

        let body = json!({
            "secret": self.config.secret,
            "userId": self.config.user_id,
            "type": USER_SESSION_TYPE,
            "partnerId": self.config.partner_id,
            "expiry": Utc::now().timestamp() + self.config.session_expiry_secs,
            "privileges": "*",
        });

        let response = self
            .client
            .post(self.service_url("session", "start"))
            .query(&[("format", "1")])
            .json(&body)
            .send()
            .await
            .map_err(TranscoderError::from_reqwest)?;

        let ks: String = parse_body(&Self::read_body(response).await?)?;
        if ks.is_empty() {
            return Err(TranscoderError::Parse("empty session token".to_string()));
        }
        debug!("Kaltura session started");
        *self.session.write().await = Some(ks);
        Ok(())
    }

    async fn end_session(&self) -> Result<(), TranscoderError> {
        let Some(ks) = self.session.write().await.take() else {
            return Ok(());
        };

        let response = self
            .client
            .get(self.service_url("session", "end"))
            .query(&[("format", "1"), ("ks", ks.as_str())])
            .send()
            .await
            .map_err(TranscoderError::from_reqwest)?;
        Self::read_body(response).await?;
        debug!("Kaltura session ended");
        Ok(())
    }

    async fn create_entry(&self, name: &str, tags: &[String]) -> Result<String, TranscoderError> {
        let body = json!({
            "entry": {
                "name": name,
                "objectType": "KalturaMediaEntry",
                "userId": self.config.user_id,
                "creatorId": self.config.user_id,
                "tags": tags.join(","),
                "mediaType": VIDEO_MEDIA_TYPE,
                "sourceType": FILE_SOURCE_TYPE,
            }
        });

        let entry: KalturaMediaEntry = self.call("media", "add", body).await?;
        if entry.id.is_empty() {
            return Err(TranscoderError::Parse("unable to get entry id".to_string()));
        }
        Ok(entry.id)
    }

    async fn upload_content(&self, entry_id: &str, path: &Path) -> Result<(), TranscoderError> {
        let ks = self.ks().await?;

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TranscoderError::Io(format!("{}: {}", path.display(), e)))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| TranscoderError::Io(format!("{}: {}", path.display(), e)))?
            .len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = multipart::Part::stream_with_length(Body::from(file), length)
            .file_name(file_name);
        let form = multipart::Form::new()
            .text("entryId", entry_id.to_string())
            .text("resource:objectType", "KalturaUploadedFileResource")
            .part("resource:fileData", part);

        let response = self
            .client
            .post(self.service_url("media", "addContent"))
            .query(&[("format", "1"), ("ks", ks.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(TranscoderError::from_reqwest)?;

        let body = Self::read_body(response).await?;
        check_api_error(&body)?;
        debug!(entry_id, bytes = length, "Uploaded entry content");
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> Result<RemoteEntry, TranscoderError> {
        let entry: KalturaMediaEntry = self
            .call("media", "get", json!({ "entryId": entry_id }))
            .await?;
        Ok(RemoteEntry {
            id: entry.id,
            status: EntryStatus::from_kaltura(entry.status),
            download_url: entry.download_url,
            thumbnail_url: entry.thumbnail_url,
        })
    }

    async fn list_variants(&self, entry_id: &str) -> Result<Vec<Variant>, TranscoderError> {
        let body = json!({
            "filter": {
                "objectType": "KalturaAssetFilter",
                "entryIdEqual": entry_id,
            }
        });
        let list: KalturaFlavorList = self.call("flavorAsset", "list", body).await?;
        Ok(list
            .objects
            .into_iter()
            .map(|f| Variant {
                id: f.id,
                size_kb: f.size,
                file_ext: f.file_ext,
                width: f.width,
                height: f.height,
                bitrate: f.bitrate,
                container_format: f.container_format,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> KalturaClient {
        KalturaClient::new(KalturaConfig {
            url: server.uri(),
            partner_id: 42,
            user_id: "bot".to_string(),
            secret: "s3cret".to_string(),
            session_expiry_secs: 1800,
            timeout_secs: 5,
        })
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api_v3/service/session/action/start"))
            .and(body_partial_json(json!({ "partnerId": 42, "secret": "s3cret" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("\"KS123\""))
            .mount(server)
            .await;
    }

    #[test]
    fn test_check_api_error() {
        assert!(check_api_error("\"KS\"").is_ok());
        assert!(check_api_error(r#"{"id":"0_x","status":2}"#).is_ok());
        let err = check_api_error(
            r#"{"code":"ENTRY_ID_NOT_FOUND","message":"Entry not found","objectType":"KalturaAPIException"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TranscoderError::Api { code, .. } if code == "ENTRY_ID_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_calls_require_session() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        assert!(matches!(
            client.get_entry("0_x").await,
            Err(TranscoderError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_create_and_get_entry() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/api_v3/service/media/action/add"))
            .and(query_param("ks", "KS123"))
            .and(body_partial_json(json!({ "entry": { "tags": "a,b", "mediaType": 1 } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "0_new", "status": 7 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api_v3/service/media/action/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "0_new",
                "status": 2,
                "downloadUrl": "https://cdn.example.org/0_new.mp4",
                "thumbnailUrl": "https://cdn.example.org/0_new.jpg"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.start_session().await.unwrap();
        let id = client
            .create_entry("movie.mp4", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(id, "0_new");

        let entry = client.get_entry(&id).await.unwrap();
        assert_eq!(entry.status, EntryStatus::Ready);
        assert_eq!(entry.download_url, "https://cdn.example.org/0_new.mp4");
    }

    #[tokio::test]
    async fn test_list_variants() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/api_v3/service/flavorAsset/action/list"))
            .and(body_partial_json(json!({ "filter": { "entryIdEqual": "0_x" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalCount": 1,
                "objects": [{
                    "id": "0_f1", "size": 1500, "fileExt": "mp4",
                    "width": 1280, "height": 720, "bitrate": 2000,
                    "containerFormat": "isom"
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.start_session().await.unwrap();
        let variants = client.list_variants("0_x").await.unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].size_bytes(), 1500 * 1024);
        assert_eq!(variants[0].file_ext, "mp4");
    }

    #[tokio::test]
    async fn test_upload_content_and_end_session() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/api_v3/service/media/action/addContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "0_x" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api_v3/service/session/action/end"))
            .and(query_param("ks", "KS123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not really a video").unwrap();

        let client = client_for(&server);
        client.start_session().await.unwrap();
        client.upload_content("0_x", file.path()).await.unwrap();
        client.end_session().await.unwrap();
        // Second close is a no-op.
        client.end_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_api_exception_is_reported() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/api_v3/service/media/action/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "ENTRY_ID_NOT_FOUND",
                "message": "Entry id \"0_x\" not found",
                "objectType": "KalturaAPIException"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.start_session().await.unwrap();
        assert!(matches!(
            client.get_entry("0_x").await,
            Err(TranscoderError::Api { .. })
        ));
    }
}
