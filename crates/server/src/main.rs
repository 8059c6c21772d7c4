use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelcrawl_core::{
    create_delivery_system, create_notifier, create_torrent_client, feed::MetaSource,
    load_config, validate_config, AdmissionFilter, Config, ControlService, ConversionMachine,
    DownloadDispatcher, HttpFeedClient, HttpMetaSource, ItemRepository, KalturaClient, Notifier,
    OffsetCrawler, PipelineRunner, SanitizedConfig, SqliteItemRepository, TorrentClient,
    Transcoder,
};

use reelcrawl_server::api::create_router;
use reelcrawl_server::shutdown::drain_deliveries;
use reelcrawl_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("REELCRAWL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Logging format is part of the config, so the subscriber comes second
    init_logging(config.logging.json);
    info!("Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Hash of the sanitized config, logged so deployments can be told apart
    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);

    // Create SQLite repository
    let repository: Arc<dyn ItemRepository> = Arc::new(
        SqliteItemRepository::new(&config.database.path)
            .context("Failed to open item repository")?,
    );
    seed_subscribers(repository.as_ref(), &config).context("Failed to seed subscribers")?;
    info!(
        offset = repository.crawl_offset().context("Failed to read crawl offset")?,
        "Item repository initialized"
    );

    // Crawler
    let filter = AdmissionFilter::new(&config.crawler.ignore_pattern)
        .context("Invalid crawler.ignore_pattern")?;
    let feed = Arc::new(HttpFeedClient::new(
        config.crawler.base_url.clone(),
        config.crawler.context_url.clone(),
    ));
    let mut crawler = OffsetCrawler::new(feed, Arc::clone(&repository), filter)
        .with_skip_failed_offsets(config.crawler.skip_failed_offsets);
    if let Some(meta_config) = &config.crawler.meta {
        let meta: Arc<dyn MetaSource> = Arc::new(
            HttpMetaSource::new(config.crawler.base_url.clone(), meta_config)
                .context("Invalid crawler.meta rules")?,
        );
        info!(rules = meta_config.rules.len(), "Metadata scraping enabled");
        crawler = crawler.with_meta_source(meta);
    }
    let crawler = Arc::new(crawler);

    // Download dispatcher
    let torrent_client = create_torrent_client(&config.download).ok_or_else(|| {
        anyhow!(
            "download backend {:?} selected but its section is missing",
            config.download.backend
        )
    })?;
    info!(backend = torrent_client.name(), "Torrent client initialized");
    let dispatcher = Arc::new(
        DownloadDispatcher::new(torrent_client, config.download.target_dir.clone())
            .with_trackers(config.download.trackers.clone()),
    );

    // Notification delivery
    let notifier = create_notifier(&config.notify);
    info!(notifier = notifier.name(), "Notifier initialized");
    let (delivery, worker, mut failures) =
        create_delivery_system(notifier, config.notify.queue_size);
    let worker_handle = tokio::spawn(worker.run());
    let failure_drain = tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            error!(
                targets = ?failure.targets,
                error = %failure.error,
                at = %failure.timestamp,
                "Notification delivery failed"
            );
        }
    });

    // Conversion
    let transcoder: Arc<dyn Transcoder> =
        Arc::new(KalturaClient::new(config.transcoder.kaltura.clone()));
    let conversion = Arc::new(ConversionMachine::new(
        Arc::clone(&repository),
        transcoder,
        delivery.clone(),
        &config.transcoder,
    ));

    // Background pipeline
    let pipeline = Arc::new(PipelineRunner::new(
        Arc::clone(&repository),
        Arc::clone(&crawler),
        Arc::clone(&dispatcher),
        conversion,
        config.crawler.threshold,
        Duration::from_secs(config.crawler.delay_secs),
    ));
    pipeline.start().await;

    // Operator commands
    let control = Arc::new(
        ControlService::new(Arc::clone(&repository), crawler, dispatcher, delivery)
            .with_version(VERSION),
    );

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        repository,
        control,
        Arc::clone(&pipeline),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    pipeline.stop().await;

    // The pipeline loop and the router hold the remaining DeliveryHandle
    // clones; the worker exits once they are all gone.
    drop(pipeline);
    drain_deliveries(worker_handle, failure_drain, Duration::from_secs(10)).await;

    Ok(())
}

/// Register the configured admin and subscriber chats.
fn seed_subscribers(repository: &dyn ItemRepository, config: &Config) -> Result<()> {
    for &chat in &config.notify.admins {
        repository.add_admin(chat)?;
    }
    for &chat in &config.notify.chats {
        repository.add_chat(chat)?;
    }
    if !config.notify.admins.is_empty() || !config.notify.chats.is_empty() {
        info!(
            admins = config.notify.admins.len(),
            chats = config.notify.chats.len(),
            "Seeded subscribers"
        );
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
