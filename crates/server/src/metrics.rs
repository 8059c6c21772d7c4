//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the reelcrawl server:
//! - HTTP request metrics (latency, counts)
//! - Pipeline and conversion backlog (collected dynamically)
//!
//! Core metrics (crawler, downloads, conversion, deliveries) are registered
//! into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelcrawl_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelcrawl_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelcrawl_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics (collected dynamically)
// =============================================================================

/// Pipeline running state (1 = running, 0 = stopped).
pub static PIPELINE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelcrawl_pipeline_running",
        "Whether the pipeline loop is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Completed pipeline cycles since startup.
pub static PIPELINE_CYCLES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelcrawl_pipeline_cycles",
        "Completed pipeline cycles since startup",
    )
    .unwrap()
});

/// Files not yet delivered.
pub static FILES_NOT_READY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelcrawl_files_not_ready",
        "Number of files whose status is not ready",
    )
    .unwrap()
});

/// Subscribed chats.
pub static SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("reelcrawl_subscribers", "Number of subscribed chats").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Pipeline
    registry
        .register(Box::new(PIPELINE_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(PIPELINE_CYCLES.clone()))
        .unwrap();
    registry
        .register(Box::new(FILES_NOT_READY.clone()))
        .unwrap();
    registry.register(Box::new(SUBSCRIBERS.clone())).unwrap();

    // Core metrics (crawler, downloads, conversion, deliveries)
    for metric in reelcrawl_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the pipeline and repository
/// at scrape time.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let status = state.pipeline().status().await;
    PIPELINE_RUNNING.set(if status.running { 1 } else { 0 });
    PIPELINE_CYCLES.set(status.cycles as i64);

    if let Ok(files) = state.repository().files_not_ready() {
        FILES_NOT_READY.set(files.len() as i64);
    }
    if let Ok(chats) = state.repository().chats() {
        SUBSCRIBERS.set(chats.len() as i64);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let hash_regex = regex_lite::Regex::new(r"[0-9a-fA-F]{40}").unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/-?\d+(/|$)").unwrap();

    let result = hash_regex.replace_all(path, "{hash}");
    // Adjacent numeric segments share a slash, so run twice.
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_file_id() {
        let path = "/api/v1/files/42/switch";
        assert_eq!(normalize_path(path), "/api/v1/files/{id}/switch");
    }

    #[test]
    fn test_normalize_path_offset() {
        let path = "/api/v1/offsets/1200345/force";
        assert_eq!(normalize_path(path), "/api/v1/offsets/{id}/force");
    }

    #[test]
    fn test_normalize_path_hash() {
        let path = "/api/v1/torrents/a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
        assert_eq!(normalize_path(path), "/api/v1/torrents/{hash}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("reelcrawl_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Vec metrics only appear once a label set has been touched.
        reelcrawl_core::metrics::OFFSETS_SCANNED.inc();
        reelcrawl_core::metrics::ITEMS_ADMITTED
            .with_label_values(&["accepted"])
            .inc();
        PIPELINE_RUNNING.set(0);
        FILES_NOT_READY.set(0);

        let output = encode_metrics();

        assert!(output.contains("reelcrawl_offsets_scanned_total"));
        assert!(output.contains("reelcrawl_items_admitted_total"));
        assert!(output.contains("reelcrawl_pipeline_running"));
        assert!(output.contains("reelcrawl_files_not_ready"));
    }
}
