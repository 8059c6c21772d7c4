use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config. Every upstream points at a closed port,
/// so background cycles fail fast without touching the network.
fn minimal_config(port: u16, db: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[database]
path = "{db}"

[crawler]
base_url = "http://127.0.0.1:1"
context_url = "/download.php?id={{offset}}"
delay_secs = 3600

[download]
backend = "transmission"
target_dir = "/tmp"

[download.transmission]
url = "http://127.0.0.1:1/transmission/rpc"

[transcoder]
files_path = "/tmp"

[transcoder.kaltura]
url = "http://127.0.0.1:1"
partner_id = 1
user_id = "bot"
secret = "top-secret"
"#,
        port = port,
        db = db.display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// A running server process with its config and database kept alive.
struct RunningServer {
    child: tokio::process::Child,
    port: u16,
    _config: NamedTempFile,
    _dir: TempDir,
}

impl RunningServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let port = get_available_port();
        let config = write_config(&minimal_config(port, &dir.path().join("reelcrawl.db")));

        let child = tokio::process::Command::new(env!("CARGO_BIN_EXE_reelcrawl"))
            .env("REELCRAWL_CONFIG", config.path())
            .env("RUST_LOG", "error") // Quiet logs during tests
            .kill_on_drop(true)
            .spawn()
            .expect("Failed to spawn server");

        let server = Self {
            child,
            port,
            _config: config,
            _dir: dir,
        };
        assert!(server.wait_ready(100).await, "Server did not start in time");
        server
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn wait_ready(&self, max_attempts: u32) -> bool {
        let client = Client::new();
        for _ in 0..max_attempts {
            if client.get(self.url("/api/v1/health")).send().await.is_ok() {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }
        false
    }

    async fn stop(mut self) {
        self.child.kill().await.ok();
    }
}

/// Run the binary against `config_path` and wait for it to exit.
async fn run_to_exit(config_path: &Path) -> std::process::Output {
    timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_reelcrawl"))
            .env("REELCRAWL_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = RunningServer::start().await;

    let response = Client::new()
        .get(server.url("/api/v1/health"))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn test_config_endpoint_returns_sanitized() {
    let server = RunningServer::start().await;

    let response = Client::new()
        .get(server.url("/api/v1/config"))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body = response.text().await.expect("Failed to read body");
    let json: serde_json::Value = serde_json::from_str(&body).expect("Failed to parse JSON");
    assert_eq!(json["server"]["port"], server.port);
    assert!(!body.contains("top-secret"));

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_are_served_at_root() {
    let server = RunningServer::start().await;

    let body = Client::new()
        .get(server.url("/metrics"))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .expect("Failed to read body");

    assert!(body.contains("reelcrawl_pipeline_running"));

    server.stop().await;
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let output = run_to_exit(Path::new("/nonexistent/config.toml")).await;

    assert!(!output.status.success());
}

#[tokio::test]
async fn test_context_url_without_offset_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let content = minimal_config(get_available_port(), &dir.path().join("reelcrawl.db"))
        .replace("/download.php?id={offset}", "/download.php");
    let config = write_config(&content);

    let output = run_to_exit(config.path()).await;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("{offset}"));
}
