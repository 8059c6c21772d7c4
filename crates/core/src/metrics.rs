//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Crawler (offsets scanned, admission decisions, feed errors)
//! - Downloads (submissions, removals)
//! - Conversion (file transitions, deliveries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Crawler
// =============================================================================

/// Offsets counted as scanned.
pub static OFFSETS_SCANNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelcrawl_offsets_scanned_total",
        "Total feed offsets scanned",
    )
    .unwrap()
});

/// Current persisted crawl offset.
pub static CRAWL_OFFSET: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("reelcrawl_crawl_offset", "Next feed offset to examine").unwrap()
});

/// Admission decisions for discovered torrents.
pub static ITEMS_ADMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelcrawl_items_admitted_total",
            "Admission decisions for discovered torrents",
        ),
        &["decision"], // "accepted", "duplicate", "ignored", "empty"
    )
    .unwrap()
});

/// Failed feed fetches.
pub static FEED_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelcrawl_feed_errors_total", "Total failed feed fetches").unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Download backend operations by result.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelcrawl_downloads_total",
            "Download backend operations by result",
        ),
        &["result"], // "submitted", "failed", "removed"
    )
    .unwrap()
});

// =============================================================================
// Conversion
// =============================================================================

/// File status transitions by target status.
pub static FILE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelcrawl_file_transitions_total",
            "File status transitions by target status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Notification deliveries by result.
pub static DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelcrawl_deliveries_total", "Notification deliveries"),
        &["result"], // "sent", "failed", "dropped"
    )
    .unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Duration of each pipeline stage.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelcrawl_stage_duration_seconds",
            "Duration of pipeline stages",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["stage"], // "crawl", "dispatch", "sweep"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(OFFSETS_SCANNED.clone()),
        Box::new(CRAWL_OFFSET.clone()),
        Box::new(ITEMS_ADMITTED.clone()),
        Box::new(FEED_ERRORS.clone()),
        Box::new(DOWNLOADS.clone()),
        Box::new(FILE_TRANSITIONS.clone()),
        Box::new(DELIVERIES.clone()),
        Box::new(STAGE_DURATION.clone()),
    ]
}
