//! Operator commands.
//!
//! Every command answers the requesting chat through the delivery queue and
//! also returns its result, so the HTTP API and chat transports can share it.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::crawler::{CrawlError, OffsetCrawler};
use crate::dispatcher::DownloadDispatcher;
use crate::metrics;
use crate::notify::{Delivery, DeliveryHandle, Notice};
use crate::repository::{FileStatus, ItemRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("file not found: {0}")]
    FileNotFound(i64),

    #[error("file {file_id} is {status}, only converting and ready files can be switched")]
    InvalidState { file_id: i64, status: FileStatus },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("crawl error: {0}")]
    Crawl(#[from] CrawlError),
}

/// Answer to a state query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateReport {
    pub chat: i64,
    pub subscribed: bool,
    pub admin: bool,
    pub version: String,
    pub offset: u64,
    /// Names of files not yet Ready, in id order.
    pub pending: Vec<String>,
}

pub struct ControlService {
    repository: Arc<dyn ItemRepository>,
    crawler: Arc<OffsetCrawler>,
    dispatcher: Arc<DownloadDispatcher>,
    delivery: DeliveryHandle,
    version: String,
}

impl ControlService {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        crawler: Arc<OffsetCrawler>,
        dispatcher: Arc<DownloadDispatcher>,
        delivery: DeliveryHandle,
    ) -> Self {
        Self {
            repository,
            crawler,
            dispatcher,
            delivery,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Flip a file between Converting and Ready. Admins only.
    pub async fn switch_status(&self, file_id: i64, chat: i64) -> Result<FileStatus, ControlError> {
        self.require_admin(chat).await?;

        let result = self.switch(file_id);
        match &result {
            Ok((file_name, status)) => {
                info!(file_id, chat, status = %status, "File status switched");
                self.reply(
                    chat,
                    Notice::StatusSwitched {
                        file_id,
                        file_name: file_name.clone(),
                        status: *status,
                    },
                )
                .await;
            }
            Err(e) => self.reply_error(chat, e).await,
        }
        result.map(|(_, status)| status)
    }

    fn switch(&self, file_id: i64) -> Result<(String, FileStatus), ControlError> {
        let file = self
            .repository
            .get_file(file_id)?
            .ok_or(ControlError::FileNotFound(file_id))?;

        let next = match file.status {
            FileStatus::Converting => FileStatus::Ready,
            FileStatus::Ready => FileStatus::Converting,
            status => return Err(ControlError::InvalidState { file_id, status }),
        };
        self.repository.set_file_status(file_id, next)?;
        metrics::FILE_TRANSITIONS
            .with_label_values(&[next.as_str()])
            .inc();
        Ok((file.name, next))
    }

    /// Check one feed offset now and dispatch what it holds. Admins only.
    ///
    /// Returns the name of the submitted item, if any.
    pub async fn force_check(&self, offset: u64, chat: i64) -> Result<Option<String>, ControlError> {
        self.require_admin(chat).await?;

        let item = match self.crawler.force_check(offset).await {
            Ok(item) => item,
            Err(e) => {
                let e = ControlError::from(e);
                self.reply_error(chat, &e).await;
                return Err(e);
            }
        };

        let item_name = match item {
            Some(item) => {
                let report = self.dispatcher.reconcile_and_submit(&[item.clone()]).await;
                info!(offset, name = %item.name, submitted = report.submitted.len(), "Forced check dispatched");
                Some(item.name)
            }
            None => None,
        };

        self.reply(
            chat,
            Notice::ForcedCheck {
                offset,
                item_name: item_name.clone(),
            },
        )
        .await;
        Ok(item_name)
    }

    /// Crawl progress and not-ready files. Subscribers and admins only.
    pub async fn state(&self, chat: i64) -> Result<StateReport, ControlError> {
        let subscribed = self.repository.is_chat(chat)?;
        let admin = self.repository.is_admin(chat)?;
        if !subscribed && !admin {
            self.reply(chat, Notice::Unauthorized).await;
            return Err(ControlError::Unauthorized);
        }

        let report = StateReport {
            chat,
            subscribed,
            admin,
            version: self.version.clone(),
            offset: self.repository.crawl_offset()?,
            pending: self
                .repository
                .files_not_ready()?
                .into_iter()
                .map(|f| f.name)
                .collect(),
        };

        self.reply(
            chat,
            Notice::State {
                version: report.version.clone(),
                offset: report.offset,
                pending: report.pending.clone(),
            },
        )
        .await;
        Ok(report)
    }

    /// Add a chat to the subscriber (or admin) set.
    pub fn attach(&self, chat: i64, admin: bool) -> Result<(), ControlError> {
        if admin {
            self.repository.add_admin(chat)?;
        } else {
            self.repository.add_chat(chat)?;
        }
        Ok(())
    }

    /// Remove a chat from both sets.
    pub fn detach(&self, chat: i64) -> Result<(), ControlError> {
        self.repository.remove_chat(chat)?;
        self.repository.remove_admin(chat)?;
        Ok(())
    }

    async fn require_admin(&self, chat: i64) -> Result<(), ControlError> {
        if self.repository.is_admin(chat)? {
            return Ok(());
        }
        warn!(chat, "Rejected command from non-admin chat");
        self.reply(chat, Notice::Unauthorized).await;
        Err(ControlError::Unauthorized)
    }

    async fn reply(&self, chat: i64, notice: Notice) {
        self.delivery.send(Delivery::new(vec![chat], notice)).await;
    }

    async fn reply_error(&self, chat: i64, error: &ControlError) {
        self.reply(
            chat,
            Notice::CommandFailed {
                error: error.to_string(),
            },
        )
        .await;
    }
}
