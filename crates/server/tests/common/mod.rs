//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the full in-process
//! router with mock feed, torrent client, transcoder and notifier injected,
//! so the HTTP surface can be exercised without external infrastructure.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use reelcrawl_core::{
    create_delivery_system, load_config_from_str, AdmissionFilter, Config, ControlService,
    ConversionMachine, DownloadDispatcher, ItemRepository, OffsetCrawler, PipelineRunner,
    SqliteItemRepository,
    testing::{MockFeed, MockNotifier, MockTorrentClient, MockTranscoder, SentNotice},
};
use reelcrawl_server::api::create_router;
use reelcrawl_server::state::AppState;

/// Re-export fixtures for test convenience
pub use reelcrawl_core::testing::fixtures;

pub const ADMIN_CHAT: i64 = 1001;
pub const SUBSCRIBER_CHAT: i64 = 2002;
pub const STRANGER_CHAT: i64 = 3003;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_state() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.get("/api/v1/state?chat=2002").await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub repository: Arc<dyn ItemRepository>,
    pub pipeline: Arc<PipelineRunner>,
    /// Mock feed - configure offsets
    pub feed: Arc<MockFeed>,
    /// Mock torrent client - observe submissions
    pub torrent_client: Arc<MockTorrentClient>,
    pub transcoder: Arc<MockTranscoder>,
    /// Mock notifier - observe chat replies
    pub notifier: Arc<MockNotifier>,
    /// Temporary directory for the test database and payload files
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp_dir);

        let repository: Arc<dyn ItemRepository> = Arc::new(
            SqliteItemRepository::new(&config.database.path)
                .expect("Failed to create repository"),
        );
        repository.add_admin(ADMIN_CHAT).unwrap();
        repository.add_chat(SUBSCRIBER_CHAT).unwrap();

        // Create mocks
        let feed = Arc::new(MockFeed::new());
        let torrent_client = Arc::new(MockTorrentClient::new());
        let transcoder = Arc::new(MockTranscoder::new());
        let notifier = Arc::new(MockNotifier::new());

        let (delivery, worker, _failures) = create_delivery_system(notifier.clone(), 64);
        tokio::spawn(worker.run());

        let filter = AdmissionFilter::new(&config.crawler.ignore_pattern).unwrap();
        let crawler = Arc::new(OffsetCrawler::new(
            feed.clone(),
            Arc::clone(&repository),
            filter,
        ));
        let dispatcher = Arc::new(DownloadDispatcher::new(
            torrent_client.clone(),
            config.download.target_dir.clone(),
        ));
        let conversion = Arc::new(ConversionMachine::new(
            Arc::clone(&repository),
            transcoder.clone(),
            delivery.clone(),
            &config.transcoder,
        ));
        let pipeline = Arc::new(PipelineRunner::new(
            Arc::clone(&repository),
            Arc::clone(&crawler),
            Arc::clone(&dispatcher),
            conversion,
            config.crawler.threshold,
            Duration::from_secs(config.crawler.delay_secs),
        ));
        let control = Arc::new(
            ControlService::new(Arc::clone(&repository), crawler, dispatcher, delivery)
                .with_version("test"),
        );

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&repository),
            control,
            Arc::clone(&pipeline),
        ));

        Self {
            router: create_router(state),
            repository,
            pipeline,
            feed,
            torrent_client,
            transcoder,
            notifier,
            temp_dir,
        }
    }

    /// Store an item with a single file and return the file id.
    pub fn seed_file(&self, item: &str, file: &str, status: reelcrawl_core::FileStatus) -> i64 {
        let item_id = self.repository.add_item(item, 0, &[file.to_string()]).unwrap();
        let file_id = self.repository.item_files(item_id).unwrap()[0].id;
        self.repository.set_file_status(file_id, status).unwrap();
        file_id
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        self.send(request).await
    }

    /// Make a GET request and return the raw body
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Make a POST request with JSON body
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body_bytes).to_string())
            })
        };

        TestResponse { status, body }
    }

    /// Wait until the notifier has recorded at least `count` notices.
    pub async fn wait_for_notices(&self, count: usize) -> Vec<SentNotice> {
        for _ in 0..100 {
            let sent = self.notifier.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.notifier.sent().await
    }
}

fn test_config(temp_dir: &TempDir) -> Config {
    let toml = format!(
        r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = "{db}"

[crawler]
base_url = "https://feed.example.org"
context_url = "/download.php?id={{offset}}"
threshold = 3
delay_secs = 60

[download]
backend = "transmission"
target_dir = "/srv/incoming"

[download.transmission]

[transcoder]
files_path = "{files}"

[transcoder.kaltura]
url = "https://kaltura.example.org"
partner_id = 42
user_id = "bot"
secret = "s3cret"
"#,
        db = temp_dir.path().join("test.db").display(),
        files = temp_dir.path().display(),
    );
    load_config_from_str(&toml).expect("Failed to parse test config")
}
