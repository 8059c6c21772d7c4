use async_trait::async_trait;

use super::{Attachment, Notifier, NotifyError};

/// Writes notices to the log. Used when no transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(
        &self,
        targets: &[i64],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            ?targets,
            with_attachment = attachment.is_some(),
            "Notice: {}",
            text
        );
        Ok(())
    }
}
