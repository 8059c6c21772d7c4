//! Types for notification delivery.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport rejected message: {0}")]
    Api(String),

    #[error("failed to read attachment: {0}")]
    Io(String),

    #[error("delivery failed for {} chat(s): {}", .0.len(), first_failure(.0))]
    Partial(Vec<(i64, String)>),
}

fn first_failure(failures: &[(i64, String)]) -> String {
    failures
        .first()
        .map(|(chat, err)| format!("{}: {}", chat, err))
        .unwrap_or_default()
}

impl NotifyError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NotifyError::Timeout
        } else {
            NotifyError::Request(e.to_string())
        }
    }
}

/// Media sent along with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// A converted video served by the transcoding service.
    RemoteVideo {
        url: String,
        mime_type: String,
        size_bytes: u64,
        width: u32,
        height: u32,
    },
    /// A file uploaded straight from the download directory.
    LocalVideo { path: PathBuf, mime_type: String },
}

/// A notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `text` (HTML formatted) to every target chat.
    ///
    /// Failures for individual chats do not stop delivery to the others;
    /// they are reported together as [`NotifyError::Partial`].
    async fn notify(
        &self,
        targets: &[i64],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_error_message() {
        let err = NotifyError::Partial(vec![(5, "blocked".to_string()), (6, "gone".to_string())]);
        assert_eq!(err.to_string(), "delivery failed for 2 chat(s): 5: blocked");
    }
}
