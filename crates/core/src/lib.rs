pub mod config;
pub mod control;
pub mod conversion;
pub mod crawler;
pub mod dispatcher;
pub mod feed;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod repository;
pub mod testing;
pub mod torrent_client;
pub mod transcoder;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use control::{ControlError, ControlService, StateReport};
pub use conversion::{ConversionError, ConversionMachine, StepOutcome, SweepReport};
pub use crawler::{Admission, AdmissionFilter, CrawlError, CycleOutcome, OffsetCrawler};
pub use dispatcher::{DispatchReport, DownloadDispatcher};
pub use feed::{FeedClient, FeedError, FeedFetch, HttpFeedClient, HttpMetaSource, ParsedItem};
pub use notify::{
    create_delivery_system, create_notifier, Delivery, DeliveryFailure, DeliveryHandle,
    DeliveryWorker, Notice, Notifier, NotifyError,
};
pub use pipeline::{CycleReport, PipelineError, PipelineRunner, PipelineStatus};
pub use repository::{FileStatus, ItemRepository, RepositoryError, SqliteItemRepository};
pub use torrent_client::{create_torrent_client, TorrentClient, TorrentClientError};
pub use transcoder::{KalturaClient, Transcoder, TranscoderError};
