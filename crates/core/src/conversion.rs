//! Per-file conversion state machine.
//!
//! Every sweep walks the files that are not Ready and moves each one at most
//! one step: Pending files whose payload is on disk are uploaded to the
//! transcoder, Converting files whose entry finished are marked Ready and
//! delivered to subscribers. Nothing is cached between sweeps.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::TranscoderConfig;
use crate::metrics;
use crate::notify::{Attachment, Delivery, DeliveryHandle, Notice};
use crate::repository::{FileStatus, ItemFile, ItemRepository, RepositoryError};
use crate::transcoder::{EntryStatus, RemoteEntry, Transcoder, TranscoderError, Variant};

/// Errors that leave a file where it was.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("transcoder error: {0}")]
    Transcoder(#[from] TranscoderError),

    #[error("entry id not set for file {0}")]
    MissingEntryId(i64),

    #[error("no variants for entry {0}")]
    NoVariants(String),

    #[error("invalid download url: {0:?}")]
    InvalidDownloadUrl(String),

    #[error("payload path escapes the files directory: {0}")]
    OutsideFilesPath(PathBuf),
}

/// What a single step did to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Payload not on disk yet, or the transcoder is still working.
    Waiting,
    /// Uploaded; the file is now Converting (or Ready in direct-upload mode).
    Uploaded { entry_id: String },
    /// Conversion finished and the file is Ready.
    Ready,
    /// Upload failed and the file was moved to Error.
    Failed { error: String },
    /// Ready or Error files are never advanced automatically.
    Skipped,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub waiting: usize,
    pub uploaded: usize,
    pub ready: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Steps that errored without a transition.
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Waiting => self.waiting += 1,
            StepOutcome::Uploaded { .. } => self.uploaded += 1,
            StepOutcome::Ready => self.ready += 1,
            StepOutcome::Failed { .. } => self.failed += 1,
            StepOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub struct ConversionMachine {
    repository: Arc<dyn ItemRepository>,
    transcoder: Arc<dyn Transcoder>,
    delivery: DeliveryHandle,
    files_path: PathBuf,
    direct_upload: bool,
    tags: Vec<String>,
}

impl ConversionMachine {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        transcoder: Arc<dyn Transcoder>,
        delivery: DeliveryHandle,
        config: &TranscoderConfig,
    ) -> Self {
        Self {
            repository,
            transcoder,
            delivery,
            files_path: config.files_path.clone(),
            direct_upload: config.direct_upload,
            tags: config.tags.clone(),
        }
    }

    /// Advance every not-ready file by at most one step.
    ///
    /// A transcoder session is held for the duration of the sweep. Failing to
    /// open it aborts this sweep only; per-file errors are logged and counted.
    pub async fn sweep(&self) -> Result<SweepReport, ConversionError> {
        let files = self.repository.files_not_ready()?;
        let mut report = SweepReport::default();

        let active = files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Pending | FileStatus::Converting))
            .count();
        if active == 0 {
            report.skipped = files.len();
            debug!("No files to convert");
            return Ok(report);
        }

        self.transcoder.start_session().await?;

        for file in &files {
            match self.step(file).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(file_id = file.id, name = %file.name, error = %e, "Conversion step failed");
                    report.errors += 1;
                }
            }
        }

        if let Err(e) = self.transcoder.end_session().await {
            warn!(error = %e, "Failed to close transcoder session");
        }

        info!(
            files = files.len(),
            uploaded = report.uploaded,
            ready = report.ready,
            failed = report.failed,
            errors = report.errors,
            "Conversion sweep finished"
        );
        Ok(report)
    }

    /// Advance one file. Requires an open transcoder session.
    pub async fn step(&self, file: &ItemFile) -> Result<StepOutcome, ConversionError> {
        match file.status {
            FileStatus::Pending => self.step_pending(file).await,
            FileStatus::Converting => self.step_converting(file).await,
            FileStatus::Ready | FileStatus::Error => Ok(StepOutcome::Skipped),
        }
    }

    fn payload_path(&self, file: &ItemFile) -> PathBuf {
        self.files_path.join(file.name.trim_start_matches('/'))
    }

    async fn step_pending(&self, file: &ItemFile) -> Result<StepOutcome, ConversionError> {
        let path = self.payload_path(file);
        match tokio::fs::metadata(&path).await {
            Ok(stat) => {
                debug!(path = %path.display(), size = stat.len(), "Found payload file");
            }
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::Interrupted) => {
                return Ok(StepOutcome::Waiting);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to stat payload file");
                return Ok(StepOutcome::Waiting);
            }
        }

        match self.is_within_files_path(&path).await {
            Ok(true) => {}
            Ok(false) => {
                error!(file_id = file.id, path = %path.display(), "Payload outside files directory");
                return self.fail_file(file, ConversionError::OutsideFilesPath(path)).await;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to resolve payload path");
                return Ok(StepOutcome::Waiting);
            }
        }

        match self.upload(file, &path).await {
            Ok(entry_id) => {
                info!(file_id = file.id, entry_id = %entry_id, "Uploaded file for conversion");
                self.notify_admins(Notice::FileUploaded {
                    file_id: file.id,
                    file_name: file.name.clone(),
                    entry_id: entry_id.clone(),
                })
                .await;
                if self.direct_upload {
                    if let Err(e) = self.deliver_local(file, &path).await {
                        error!(file_id = file.id, error = %e, "Failed to deliver uploaded file");
                    }
                }
                Ok(StepOutcome::Uploaded { entry_id })
            }
            Err(e) => {
                error!(file_id = file.id, name = %file.name, error = %e, "Upload failed");
                self.fail_file(file, e).await
            }
        }
    }

    async fn fail_file(
        &self,
        file: &ItemFile,
        error: ConversionError,
    ) -> Result<StepOutcome, ConversionError> {
        self.transition(file.id, FileStatus::Error)?;
        self.notify_admins(Notice::FileFailed {
            file_id: file.id,
            file_name: file.name.clone(),
            error: error.to_string(),
        })
        .await;
        Ok(StepOutcome::Failed {
            error: error.to_string(),
        })
    }

    /// Whether `path` resolves to somewhere below the files directory.
    async fn is_within_files_path(&self, path: &Path) -> std::io::Result<bool> {
        let root = tokio::fs::canonicalize(&self.files_path).await?;
        Ok(tokio::fs::canonicalize(path).await?.starts_with(root))
    }

    async fn upload(&self, file: &ItemFile, path: &Path) -> Result<String, ConversionError> {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.name.clone());

        let entry_id = self
            .transcoder
            .create_entry(&display_name, &self.tags)
            .await?;
        self.transcoder.upload_content(&entry_id, path).await?;
        self.repository.set_file_entry_id(file.id, &entry_id)?;

        let status = if self.direct_upload {
            FileStatus::Ready
        } else {
            FileStatus::Converting
        };
        self.transition(file.id, status)?;
        Ok(entry_id)
    }

    async fn step_converting(&self, file: &ItemFile) -> Result<StepOutcome, ConversionError> {
        let entry_id = file
            .entry_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ConversionError::MissingEntryId(file.id))?;

        let entry = self.transcoder.get_entry(entry_id).await?;
        if entry.status != EntryStatus::Ready {
            debug!(file_id = file.id, entry_id, status = ?entry.status, "Entry not ready");
            return Ok(StepOutcome::Waiting);
        }

        let variant = self
            .transcoder
            .list_variants(entry_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ConversionError::NoVariants(entry_id.to_string()))?;

        self.transition(file.id, FileStatus::Ready)?;
        info!(file_id = file.id, entry_id, "Conversion finished");

        if let Err(e) = self.deliver_remote(file, &entry, &variant).await {
            error!(file_id = file.id, error = %e, "Failed to deliver converted file");
        }
        Ok(StepOutcome::Ready)
    }

    fn transition(&self, file_id: i64, status: FileStatus) -> Result<(), RepositoryError> {
        self.repository.set_file_status(file_id, status)?;
        metrics::FILE_TRANSITIONS
            .with_label_values(&[status.as_str()])
            .inc();
        Ok(())
    }

    async fn deliver_remote(
        &self,
        file: &ItemFile,
        entry: &RemoteEntry,
        variant: &Variant,
    ) -> Result<(), ConversionError> {
        let url = reqwest::Url::parse(&entry.download_url)
            .ok()
            .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
            .ok_or_else(|| ConversionError::InvalidDownloadUrl(entry.download_url.clone()))?;

        let attachment = Attachment::RemoteVideo {
            url: url.to_string(),
            mime_type: variant.mime_type(),
            size_bytes: variant.size_bytes(),
            width: variant.width,
            height: variant.height,
        };
        self.deliver_video(file, attachment).await
    }

    async fn deliver_local(&self, file: &ItemFile, path: &Path) -> Result<(), ConversionError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "mp4".to_string());
        let attachment = Attachment::LocalVideo {
            path: path.to_path_buf(),
            mime_type: format!("video/{}", ext),
        };
        self.deliver_video(file, attachment).await
    }

    async fn deliver_video(
        &self,
        file: &ItemFile,
        attachment: Attachment,
    ) -> Result<(), ConversionError> {
        let meta = self.repository.item_meta(file.item_id)?;
        let chats = self.repository.chats()?;
        let ordinal = self.repository.file_ordinal(file.id)?.unwrap_or(1);
        let item_name = self
            .repository
            .get_item(file.item_id)?
            .map(|item| item.name)
            .unwrap_or_else(|| file.name.clone());

        let notice = Notice::VideoReady {
            file_id: file.id,
            item_name,
            ordinal,
            meta,
        };
        self.delivery
            .send(Delivery::new(chats, notice).with_attachment(attachment))
            .await;
        Ok(())
    }

    async fn notify_admins(&self, notice: Notice) {
        match self.repository.admins() {
            Ok(admins) => self.delivery.send(Delivery::new(admins, notice)).await,
            Err(e) => warn!(error = %e, "Unable to read admins"),
        }
    }
}
