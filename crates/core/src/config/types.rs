use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub crawler: CrawlerConfig,
    pub download: DownloadConfig,
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reelcrawl.db")
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

/// Feed crawler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlerConfig {
    /// Feed site root (e.g., "https://tracker.example.org").
    pub base_url: String,
    /// Path appended to `base_url`; `{offset}` is replaced by the slot number.
    pub context_url: String,
    /// Base delay between cycles in seconds. Actual sleep is in `[delay, 2 * delay]`.
    #[serde(default = "default_delay")]
    pub delay_secs: u64,
    /// Number of offsets examined per cycle.
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    /// Items whose name matches this pattern are skipped. Empty matches nothing.
    #[serde(default)]
    pub ignore_pattern: String,
    /// Count failed fetches as scanned so a broken slot cannot stall the walk.
    #[serde(default)]
    pub skip_failed_offsets: bool,
    /// Optional metadata scraping from the item page.
    #[serde(default)]
    pub meta: Option<MetaConfig>,
}

fn default_delay() -> u64 {
    60
}

fn default_threshold() -> u64 {
    10
}

/// Metadata scraping configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetaConfig {
    /// Page path appended to `base_url`; `{offset}` is replaced by the slot number.
    pub page_url: String,
    /// Extraction rules. Each rule stores its first capture group under `name`.
    #[serde(default)]
    pub rules: Vec<MetaRule>,
}

/// A single named extraction rule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetaRule {
    pub name: String,
    pub pattern: String,
}

/// Download backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadBackendKind {
    Transmission,
    #[serde(rename = "qbittorrent")]
    QBittorrent,
}

/// Download dispatcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    pub backend: DownloadBackendKind,
    /// Directory the torrent client writes payloads into.
    pub target_dir: String,
    /// Trackers attached to every freshly submitted job.
    #[serde(default)]
    pub trackers: Vec<String>,
    #[serde(default)]
    pub transmission: Option<TransmissionConfig>,
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
}

/// Transmission RPC configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransmissionConfig {
    /// RPC endpoint (e.g., "http://localhost:9091/transmission/rpc")
    #[serde(default = "default_transmission_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u32,
}

fn default_transmission_url() -> String {
    "http://localhost:9091/transmission/rpc".to_string()
}

/// qBittorrent Web API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u32,
}

fn default_client_timeout() -> u32 {
    30
}

/// Transcoding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    /// Directory where downloaded payload files appear.
    pub files_path: PathBuf,
    /// Skip remote conversion and deliver the local file once uploaded.
    #[serde(default)]
    pub direct_upload: bool,
    /// Tags applied to every created entry.
    #[serde(default)]
    pub tags: Vec<String>,
    pub kaltura: KalturaConfig,
}

/// Kaltura REST API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KalturaConfig {
    /// Service URL (e.g., "https://www.kaltura.com")
    pub url: String,
    pub partner_id: i64,
    pub user_id: String,
    pub secret: String,
    /// Session lifetime in seconds.
    #[serde(default = "default_session_expiry")]
    pub session_expiry_secs: i64,
    /// Upload requests may take much longer than regular calls.
    #[serde(default = "default_transcoder_timeout")]
    pub timeout_secs: u32,
}

fn default_session_expiry() -> i64 {
    1800
}

fn default_transcoder_timeout() -> u32 {
    600
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// Telegram transport. Notices are only logged when absent.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    /// Admin chats seeded into the repository at startup.
    #[serde(default)]
    pub admins: Vec<i64>,
    /// Subscriber chats seeded into the repository at startup.
    #[serde(default)]
    pub chats: Vec<i64>,
    /// Capacity of the outgoing delivery queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            admins: Vec::new(),
            chats: Vec::new(),
            queue_size: default_queue_size(),
        }
    }
}

fn default_queue_size() -> usize {
    256
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    pub token: String,
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u32,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

/// Sanitized config for API responses and startup logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub crawler: CrawlerConfig,
    pub download_backend: DownloadBackendKind,
    pub target_dir: String,
    pub transcoder_url: String,
    pub direct_upload: bool,
    pub telegram_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            crawler: config.crawler.clone(),
            download_backend: config.download.backend,
            target_dir: config.download.target_dir.clone(),
            transcoder_url: config.transcoder.kaltura.url.clone(),
            direct_upload: config.transcoder.direct_upload,
            telegram_configured: config.notify.telegram.is_some(),
        }
    }
}
