//! Types for the background pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::conversion::SweepReport;
use crate::crawler::CrawlError;
use crate::dispatcher::DispatchReport;
use crate::repository::RepositoryError;

/// Errors that abort a pipeline cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the crawl offset failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The crawl could not persist its progress.
    #[error("crawl error: {0}")]
    Crawl(#[from] CrawlError),
}

/// What one pipeline cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub start_offset: u64,
    pub next_offset: u64,
    /// Names of newly admitted items.
    pub accepted: Vec<String>,
    pub dispatch: DispatchReport,
    /// Absent when the sweep could not run (e.g. no transcoder session).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReportSummary>,
}

/// Serializable view of a [`SweepReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReportSummary {
    pub waiting: usize,
    pub uploaded: usize,
    pub ready: usize,
    pub failed: usize,
    pub errors: usize,
}

impl From<&SweepReport> for SweepReportSummary {
    fn from(report: &SweepReport) -> Self {
        Self {
            waiting: report.waiting,
            uploaded: report.uploaded,
            ready: report.ready,
            failed: report.failed,
            errors: report.errors,
        }
    }
}

/// Current status of the pipeline runner.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    /// Completed cycles since startup.
    pub cycles: u64,
    pub last_cycle: Option<CycleReport>,
}
