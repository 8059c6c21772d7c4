//! Pipeline lifecycle integration tests.
//!
//! These tests drive whole cycles through the runner with mock feed,
//! torrent client, transcoder and notifier:
//! feed slot -> item -> download job -> pending -> converting -> ready -> delivery

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use reelcrawl_core::{
    config::{KalturaConfig, TranscoderConfig},
    create_delivery_system,
    notify::Attachment,
    testing::{fixtures, MockFeed, MockNotifier, MockTorrentClient, MockTranscoder, SentNotice},
    transcoder::EntryStatus,
    AdmissionFilter, ConversionMachine, DownloadDispatcher, FileStatus, ItemRepository,
    OffsetCrawler, PipelineRunner, SqliteItemRepository,
};

const SUBSCRIBER: i64 = 500;
const ADMIN: i64 = 9;

/// Test helper wiring all pipeline stages together.
struct TestHarness {
    repository: Arc<SqliteItemRepository>,
    feed: Arc<MockFeed>,
    torrent_client: Arc<MockTorrentClient>,
    transcoder: Arc<MockTranscoder>,
    notifier: Arc<MockNotifier>,
    runner: PipelineRunner,
    files_dir: TempDir,
    _db_dir: TempDir,
}

impl TestHarness {
    fn new(ignore_pattern: &str, batch: u64) -> Self {
        Self::with_direct_upload(ignore_pattern, batch, false)
    }

    fn with_direct_upload(ignore_pattern: &str, batch: u64, direct_upload: bool) -> Self {
        let db_dir = TempDir::new().expect("Failed to create temp dir");
        let files_dir = TempDir::new().expect("Failed to create temp dir");

        let repository = Arc::new(
            SqliteItemRepository::new(&db_dir.path().join("test.db"))
                .expect("Failed to create repository"),
        );
        repository.add_chat(SUBSCRIBER).unwrap();
        repository.add_admin(ADMIN).unwrap();

        let feed = Arc::new(MockFeed::new());
        let torrent_client = Arc::new(MockTorrentClient::new());
        let transcoder = Arc::new(MockTranscoder::new());
        let notifier = Arc::new(MockNotifier::new());

        let (delivery, worker, _failures) = create_delivery_system(notifier.clone(), 64);
        tokio::spawn(worker.run());

        let crawler = Arc::new(OffsetCrawler::new(
            feed.clone(),
            repository.clone(),
            AdmissionFilter::new(ignore_pattern).unwrap(),
        ));
        let dispatcher = Arc::new(DownloadDispatcher::new(
            torrent_client.clone(),
            files_dir.path().display().to_string(),
        ));
        let config = TranscoderConfig {
            files_path: files_dir.path().to_path_buf(),
            direct_upload,
            tags: vec!["feed".to_string()],
            kaltura: KalturaConfig {
                url: "https://kaltura.example.org".to_string(),
                partner_id: 1,
                user_id: "bot".to_string(),
                secret: "secret".to_string(),
                session_expiry_secs: 1800,
                timeout_secs: 60,
            },
        };
        let conversion = Arc::new(ConversionMachine::new(
            repository.clone(),
            transcoder.clone(),
            delivery,
            &config,
        ));
        let runner = PipelineRunner::new(
            repository.clone(),
            crawler,
            dispatcher,
            conversion,
            batch,
            Duration::from_millis(20),
        );

        Self {
            repository,
            feed,
            torrent_client,
            transcoder,
            notifier,
            runner,
            files_dir,
            _db_dir: db_dir,
        }
    }

    /// Create a payload file as the torrent client would.
    fn write_payload(&self, name: &str) {
        let path = self.files_dir.path().join(name.trim_start_matches('/'));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"video bytes").unwrap();
    }

    fn file_status(&self, name: &str) -> Option<FileStatus> {
        let item = self.repository.find_item_by_name(name).unwrap()?;
        let files = self.repository.item_files(item.id).unwrap();
        files.first().map(|f| f.status)
    }

    async fn notices_to(&self, chat: i64, at_least: usize) -> Vec<SentNotice> {
        for _ in 0..100 {
            let sent: Vec<SentNotice> = self
                .notifier
                .sent()
                .await
                .into_iter()
                .filter(|n| n.targets.contains(&chat))
                .collect();
            if sent.len() >= at_least {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }
}

#[tokio::test]
async fn test_batch_with_gap_accepts_both_items() {
    let harness = TestHarness::new("", 3);
    harness.repository.set_crawl_offset(10).unwrap();
    harness
        .feed
        .set_torrent(10, fixtures::single_file_torrent("first.mp4", 500))
        .await;
    harness
        .feed
        .set_torrent(12, fixtures::single_file_torrent("second.mp4", 900))
        .await;

    let report = harness.runner.run_once().await.unwrap();

    assert_eq!(report.start_offset, 10);
    assert_eq!(report.next_offset, 13);
    assert_eq!(report.accepted, vec!["first.mp4", "second.mp4"]);
    assert_eq!(harness.repository.crawl_offset().unwrap(), 13);
    assert!(harness.repository.find_item_by_name("first.mp4").unwrap().is_some());
    assert!(harness.repository.find_item_by_name("second.mp4").unwrap().is_some());
    assert_eq!(harness.torrent_client.submitted().await.len(), 2);
    assert_eq!(harness.feed.fetched().await.len(), 3);
}

#[tokio::test]
async fn test_ignored_name_still_advances_offset() {
    let harness = TestHarness::new("^sample_", 2);
    harness
        .feed
        .set_torrent(0, fixtures::single_file_torrent("sample_video_42", 100))
        .await;

    let report = harness.runner.run_once().await.unwrap();

    assert!(report.accepted.is_empty());
    assert_eq!(harness.repository.crawl_offset().unwrap(), 2);
    assert!(harness
        .repository
        .find_item_by_name("sample_video_42")
        .unwrap()
        .is_none());
    assert!(harness.torrent_client.submitted().await.is_empty());
}

#[tokio::test]
async fn test_offset_grows_by_batch_every_cycle() {
    let harness = TestHarness::new("", 4);

    for expected in [4, 8, 12] {
        harness.runner.run_once().await.unwrap();
        assert_eq!(harness.repository.crawl_offset().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_same_item_on_two_offsets_is_stored_once() {
    let harness = TestHarness::new("", 2);
    let torrent = fixtures::multi_file_torrent("Season", &[("e01.mkv", 10), ("e02.mkv", 20)]);
    harness.feed.set_torrent(0, torrent.clone()).await;
    harness.feed.set_torrent(3, torrent).await;

    let first = harness.runner.run_once().await.unwrap();
    let second = harness.runner.run_once().await.unwrap();

    assert_eq!(first.accepted, vec!["Season"]);
    assert!(second.accepted.is_empty());
    let item = harness.repository.find_item_by_name("Season").unwrap().unwrap();
    assert_eq!(item.offset, 0);
    assert_eq!(harness.repository.item_files(item.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_payload_waits_until_it_appears() {
    let harness = TestHarness::new("", 1);
    harness
        .feed
        .set_torrent(0, fixtures::single_file_torrent("movie.mp4", 1024))
        .await;

    let report = harness.runner.run_once().await.unwrap();
    assert_eq!(report.sweep.as_ref().unwrap().waiting, 1);
    assert_eq!(harness.file_status("movie.mp4"), Some(FileStatus::Pending));
    assert!(harness.transcoder.created().await.is_empty());

    // Still missing on the next cycle.
    harness.runner.run_once().await.unwrap();
    assert_eq!(harness.file_status("movie.mp4"), Some(FileStatus::Pending));

    harness.write_payload("/movie.mp4");
    let report = harness.runner.run_once().await.unwrap();

    assert_eq!(report.sweep.unwrap().uploaded, 1);
    assert_eq!(harness.file_status("movie.mp4"), Some(FileStatus::Converting));
    assert_eq!(
        harness.transcoder.created().await,
        vec![("movie.mp4".to_string(), vec!["feed".to_string()])]
    );
    assert_eq!(harness.transcoder.session_count().await, 0);

    let admin_notices = harness.notices_to(ADMIN, 1).await;
    assert!(admin_notices[0].text.contains("movie.mp4"));
}

#[tokio::test]
async fn test_converted_file_is_delivered_once() {
    let harness = TestHarness::new("", 1);
    harness
        .feed
        .set_torrent(0, fixtures::single_file_torrent("movie.mp4", 1024))
        .await;
    harness.write_payload("/movie.mp4");
    harness.runner.run_once().await.unwrap();
    assert_eq!(harness.file_status("movie.mp4"), Some(FileStatus::Converting));

    let entry_id = harness.transcoder.uploads().await[0].0.clone();

    // Still processing remotely: nothing changes.
    harness.runner.run_once().await.unwrap();
    assert_eq!(harness.file_status("movie.mp4"), Some(FileStatus::Converting));

    harness
        .transcoder
        .set_entry(&entry_id, EntryStatus::Ready, "https://cdn.example.org/movie.mp4")
        .await;
    harness
        .transcoder
        .set_variants(&entry_id, vec![MockTranscoder::variant("mp4", 2048)])
        .await;

    let report = harness.runner.run_once().await.unwrap();
    assert_eq!(report.sweep.unwrap().ready, 1);
    assert_eq!(harness.file_status("movie.mp4"), Some(FileStatus::Ready));

    // A Ready file is no longer swept.
    harness.runner.run_once().await.unwrap();

    let delivered = harness.notices_to(SUBSCRIBER, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let delivered_again: Vec<SentNotice> = harness
        .notifier
        .sent()
        .await
        .into_iter()
        .filter(|n| n.targets.contains(&SUBSCRIBER))
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered_again.len(), 1);
    assert_eq!(
        delivered[0].attachment,
        Some(Attachment::RemoteVideo {
            url: "https://cdn.example.org/movie.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size_bytes: 2048 * 1024,
            width: 640,
            height: 360,
        })
    );
    assert!(delivered[0].text.contains("#1"));
}

#[tokio::test]
async fn test_direct_upload_skips_remote_conversion() {
    let harness = TestHarness::with_direct_upload("", 1, true);
    harness
        .feed
        .set_torrent(0, fixtures::single_file_torrent("clip.MP4", 64))
        .await;
    harness.write_payload("/clip.MP4");

    harness.runner.run_once().await.unwrap();

    assert_eq!(harness.file_status("clip.MP4"), Some(FileStatus::Ready));
    let delivered = harness.notices_to(SUBSCRIBER, 1).await;
    assert_eq!(
        delivered[0].attachment,
        Some(Attachment::LocalVideo {
            path: harness.files_dir.path().join("clip.MP4"),
            mime_type: "video/mp4".to_string(),
        })
    );
}

#[tokio::test]
async fn test_failed_upload_moves_file_to_error() {
    let harness = TestHarness::new("", 1);
    harness
        .feed
        .set_torrent(0, fixtures::single_file_torrent("broken.mp4", 64))
        .await;
    harness.write_payload("/broken.mp4");
    harness.transcoder.fail_uploads(true).await;

    let report = harness.runner.run_once().await.unwrap();
    assert_eq!(report.sweep.unwrap().failed, 1);
    assert_eq!(harness.file_status("broken.mp4"), Some(FileStatus::Error));

    // Error files are left alone even once uploads work again.
    harness.transcoder.fail_uploads(false).await;
    harness.runner.run_once().await.unwrap();
    assert_eq!(harness.file_status("broken.mp4"), Some(FileStatus::Error));
    assert!(harness.transcoder.uploads().await.is_empty());
}

#[tokio::test]
async fn test_background_loop_runs_until_stopped() {
    let harness = TestHarness::new("", 2);

    harness.runner.start().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    harness.runner.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = harness.runner.status().await;
    assert!(!status.running);
    assert!(status.cycles >= 1);
    let offset = harness.repository.crawl_offset().unwrap();
    assert_eq!(offset, status.cycles * 2);
}
