//! Telegram Bot API transport.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Body, Client};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::TelegramConfig;

use super::{Attachment, Notifier, NotifyError};

/// Bot API caption length limit.
const MAX_CAPTION_CHARS: usize = 1024;

/// Response envelope shared by every Bot API method.
#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends notices through a Telegram bot.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn check(response: reqwest::Response) -> Result<(), NotifyError> {
        let status = response.status();
        let body: BotResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(NotifyError::Api(format!("HTTP {}", status)));
            }
            Err(e) => return Err(NotifyError::from_reqwest(e)),
        };
        if body.ok {
            Ok(())
        } else {
            Err(NotifyError::Api(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ))
        }
    }

    async fn send_message(&self, chat: i64, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({
                "chat_id": chat,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(NotifyError::from_reqwest)?;
        Self::check(response).await
    }

    async fn send_remote_video(
        &self,
        chat: i64,
        caption: &str,
        url: &str,
        width: u32,
        height: u32,
    ) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.method_url("sendVideo"))
            .json(&json!({
                "chat_id": chat,
                "video": url,
                "caption": caption,
                "parse_mode": "HTML",
                "width": width,
                "height": height,
                "supports_streaming": true,
            }))
            .send()
            .await
            .map_err(NotifyError::from_reqwest)?;
        Self::check(response).await
    }

    async fn send_local_video(
        &self,
        chat: i64,
        caption: &str,
        path: &Path,
        mime_type: &str,
    ) -> Result<(), NotifyError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| NotifyError::Io(format!("{}: {}", path.display(), e)))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| NotifyError::Io(format!("{}: {}", path.display(), e)))?
            .len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        let part = multipart::Part::stream_with_length(Body::from(file), length)
            .file_name(file_name)
            .mime_str(mime_type)
            .map_err(NotifyError::from_reqwest)?;
        let form = multipart::Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .text("supports_streaming", "true")
            .part("video", part);

        let response = self
            .client
            .post(self.method_url("sendVideo"))
            .multipart(form)
            .send()
            .await
            .map_err(NotifyError::from_reqwest)?;
        Self::check(response).await
    }

    async fn deliver(
        &self,
        chat: i64,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), NotifyError> {
        match attachment {
            None => self.send_message(chat, text).await,
            Some(Attachment::RemoteVideo {
                url, width, height, ..
            }) => {
                self.send_remote_video(chat, &truncate_caption(text), url, *width, *height)
                    .await
            }
            Some(Attachment::LocalVideo { path, mime_type }) => {
                self.send_local_video(chat, &truncate_caption(text), path, mime_type)
                    .await
            }
        }
    }
}

/// Cut a caption to the Bot API limit on a char boundary.
fn truncate_caption(text: &str) -> String {
    match text.char_indices().nth(MAX_CAPTION_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(
        &self,
        targets: &[i64],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), NotifyError> {
        let mut failures = Vec::new();
        for &chat in targets {
            match self.deliver(chat, text, attachment).await {
                Ok(()) => debug!(chat, "Delivered notice"),
                Err(e) => {
                    warn!(chat, error = %e, "Failed to deliver notice");
                    failures.push((chat, e.to_string()));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Partial(failures))
        }
    }
}
