//! HTTP API tests against the in-process router.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture, ADMIN_CHAT, STRANGER_CHAT, SUBSCRIBER_CHAT};
use reelcrawl_core::FileStatus;

// =============================================================================
// Health, config and metrics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["crawler"]["threshold"], 3);
    assert_eq!(response.body["download_backend"], "transmission");
    assert_eq!(response.body["transcoder_url"], "https://kaltura.example.org");
    assert!(!response.body.to_string().contains("s3cret"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("reelcrawl_http_requests_total"));
    assert!(body.contains("reelcrawl_pipeline_running"));
}

// =============================================================================
// Pipeline status
// =============================================================================

#[tokio::test]
async fn test_status_reports_cycles() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/status").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["running"], false);
    assert_eq!(response.body["cycles"], 0);
    assert!(response.body["last_cycle"].is_null());

    fixture
        .feed
        .set_torrent(0, fixtures::single_file_torrent("movie.mp4", 1024))
        .await;
    fixture.pipeline.run_once().await.unwrap();

    let response = fixture.get("/api/v1/status").await;
    assert_eq!(response.body["cycles"], 1);
    assert_eq!(response.body["last_cycle"]["start_offset"], 0);
    assert_eq!(response.body["last_cycle"]["next_offset"], 3);
    assert_eq!(response.body["last_cycle"]["accepted"], json!(["movie.mp4"]));
}

// =============================================================================
// State
// =============================================================================

#[tokio::test]
async fn test_state_for_subscriber() {
    let fixture = TestFixture::new().await;
    fixture.repository.set_crawl_offset(42).unwrap();
    fixture.seed_file("Show", "/show.mp4", FileStatus::Converting);

    let response = fixture
        .get(&format!("/api/v1/state?chat={}", SUBSCRIBER_CHAT))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["subscribed"], true);
    assert_eq!(response.body["admin"], false);
    assert_eq!(response.body["offset"], 42);
    assert_eq!(response.body["version"], "test");
    assert_eq!(response.body["pending"], json!(["/show.mp4"]));

    let sent = fixture.wait_for_notices(1).await;
    assert_eq!(sent[0].targets, vec![SUBSCRIBER_CHAT]);
    assert!(sent[0].text.contains("Offset: 42"));
}

#[tokio::test]
async fn test_state_for_stranger_is_forbidden() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get(&format!("/api/v1/state?chat={}", STRANGER_CHAT))
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "unauthorized");

    let sent = fixture.wait_for_notices(1).await;
    assert_eq!(sent[0].targets, vec![STRANGER_CHAT]);
    assert_eq!(sent[0].text, "Unauthorized.");
}

#[tokio::test]
async fn test_state_requires_chat() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/state").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Status switch
// =============================================================================

#[tokio::test]
async fn test_switch_toggles_back_and_forth() {
    let fixture = TestFixture::new().await;
    let file_id = fixture.seed_file("Show", "/show.mp4", FileStatus::Converting);
    let path = format!("/api/v1/files/{}/switch", file_id);

    let response = fixture.post(&path, json!({ "chat": ADMIN_CHAT })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["file_id"], file_id);
    assert_eq!(response.body["status"], "ready");

    let response = fixture.post(&path, json!({ "chat": ADMIN_CHAT })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "converting");

    let file = fixture.repository.get_file(file_id).unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Converting);

    let sent = fixture.wait_for_notices(2).await;
    assert!(sent.iter().all(|n| n.targets == vec![ADMIN_CHAT]));
    assert!(sent[0].text.contains(&format!("/switchignore {}", file_id)));
}

#[tokio::test]
async fn test_switch_by_non_admin_is_forbidden() {
    let fixture = TestFixture::new().await;
    let file_id = fixture.seed_file("Show", "/show.mp4", FileStatus::Converting);

    let response = fixture
        .post(
            &format!("/api/v1/files/{}/switch", file_id),
            json!({ "chat": SUBSCRIBER_CHAT }),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let file = fixture.repository.get_file(file_id).unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Converting);
}

#[tokio::test]
async fn test_switch_unknown_file() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/files/999/switch", json!({ "chat": ADMIN_CHAT }))
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "file not found: 999");
}

#[tokio::test]
async fn test_switch_pending_file_conflicts() {
    let fixture = TestFixture::new().await;
    let file_id = fixture.seed_file("Show", "/show.mp4", FileStatus::Pending);

    let response = fixture
        .post(
            &format!("/api/v1/files/{}/switch", file_id),
            json!({ "chat": ADMIN_CHAT }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    let file = fixture.repository.get_file(file_id).unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Pending);
}

// =============================================================================
// Forced check
// =============================================================================

#[tokio::test]
async fn test_force_check_submits_item() {
    let fixture = TestFixture::new().await;
    fixture
        .feed
        .set_torrent(77, fixtures::single_file_torrent("sample_clip.mp4", 2048))
        .await;

    let response = fixture
        .post("/api/v1/offsets/77/force", json!({ "chat": ADMIN_CHAT }))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["offset"], 77);
    assert_eq!(response.body["item"], "sample_clip.mp4");

    let submitted = fixture.torrent_client.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].name, "sample_clip.mp4");
    // The crawl offset is untouched by forced checks.
    assert_eq!(fixture.repository.crawl_offset().unwrap(), 0);
}

#[tokio::test]
async fn test_force_check_empty_offset() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/offsets/5/force", json!({ "chat": ADMIN_CHAT }))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["item"].is_null());
    assert!(fixture.torrent_client.submitted().await.is_empty());

    let sent = fixture.wait_for_notices(1).await;
    assert_eq!(sent[0].text, "Offset 5: nothing to upload.");
}

#[tokio::test]
async fn test_force_check_by_non_admin_is_forbidden() {
    let fixture = TestFixture::new().await;
    fixture
        .feed
        .set_torrent(5, fixtures::single_file_torrent("movie.mp4", 10))
        .await;

    let response = fixture
        .post("/api/v1/offsets/5/force", json!({ "chat": STRANGER_CHAT }))
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(fixture.feed.fetched().await.is_empty());
}
