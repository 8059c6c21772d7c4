//! Mock notifier for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notify::{Attachment, Notifier, NotifyError};

/// A recorded `notify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub targets: Vec<i64>,
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// Mock implementation of the Notifier trait that records every call.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: RwLock<Vec<SentNotice>>,
    failing: RwLock<bool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery (calls are still recorded).
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    pub async fn sent(&self) -> Vec<SentNotice> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(
        &self,
        targets: &[i64],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), NotifyError> {
        self.sent.write().await.push(SentNotice {
            targets: targets.to_vec(),
            text: text.to_string(),
            attachment: attachment.cloned(),
        });
        if *self.failing.read().await {
            return Err(NotifyError::Partial(
                targets
                    .iter()
                    .map(|&chat| (chat, "mock failure".to_string()))
                    .collect(),
            ));
        }
        Ok(())
    }
}
