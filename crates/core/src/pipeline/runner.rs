//! Background loop driving crawl, dispatch and conversion.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::conversion::ConversionMachine;
use crate::crawler::OffsetCrawler;
use crate::dispatcher::DownloadDispatcher;
use crate::metrics;
use crate::repository::ItemRepository;

use super::types::{CycleReport, PipelineError, PipelineStatus, SweepReportSummary};

/// Components one cycle runs through, in order.
struct Stages {
    repository: Arc<dyn ItemRepository>,
    crawler: Arc<OffsetCrawler>,
    dispatcher: Arc<DownloadDispatcher>,
    conversion: Arc<ConversionMachine>,
    batch: u64,
}

impl Stages {
    async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let started_at = Utc::now();
        let start_offset = self.repository.crawl_offset()?;

        let timer = metrics::STAGE_DURATION
            .with_label_values(&["crawl"])
            .start_timer();
        let outcome = self.crawler.run_cycle(start_offset, self.batch).await?;
        timer.observe_duration();

        let timer = metrics::STAGE_DURATION
            .with_label_values(&["dispatch"])
            .start_timer();
        let dispatch = self.dispatcher.reconcile_and_submit(&outcome.accepted).await;
        timer.observe_duration();

        let timer = metrics::STAGE_DURATION
            .with_label_values(&["sweep"])
            .start_timer();
        let sweep = match self.conversion.sweep().await {
            Ok(report) => Some(SweepReportSummary::from(&report)),
            Err(e) => {
                error!(error = %e, "Conversion sweep aborted");
                None
            }
        };
        timer.observe_duration();

        Ok(CycleReport {
            started_at,
            start_offset,
            next_offset: outcome.next_offset,
            accepted: outcome.accepted.into_iter().map(|i| i.name).collect(),
            dispatch,
            sweep,
        })
    }
}

/// Sleep between cycles: uniformly random in `[delay, 2 * delay]`.
pub fn jittered_delay(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    delay.mul_f64(1.0 + jitter_factor)
}

/// Runs the pipeline cycle forever until stopped.
pub struct PipelineRunner {
    stages: Arc<Stages>,
    delay: Duration,

    // Runtime state
    running: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    last_cycle: Arc<RwLock<Option<CycleReport>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PipelineRunner {
    /// `batch` offsets are examined per cycle; cycles are `delay` to
    /// `2 * delay` apart.
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        crawler: Arc<OffsetCrawler>,
        dispatcher: Arc<DownloadDispatcher>,
        conversion: Arc<ConversionMachine>,
        batch: u64,
        delay: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            stages: Arc::new(Stages {
                repository,
                crawler,
                dispatcher,
                conversion,
                batch,
            }),
            delay,
            running: Arc::new(AtomicBool::new(false)),
            cycles: Arc::new(AtomicU64::new(0)),
            last_cycle: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    /// Run a single cycle now, outside the background loop.
    pub async fn run_once(&self) -> Result<CycleReport, PipelineError> {
        let report = self.stages.run_cycle().await?;
        self.cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.write().await = Some(report.clone());
        Ok(report)
    }

    /// Start the background loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Pipeline already running");
            return;
        }

        info!(delay_secs = self.delay.as_secs(), batch = self.stages.batch, "Starting pipeline");
        self.spawn_loop();
    }

    /// Stop the background loop. A cycle in progress finishes first.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Pipeline not running");
            return;
        }

        info!("Stopping pipeline");
        let _ = self.shutdown_tx.send(());
    }

    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.running.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            last_cycle: self.last_cycle.read().await.clone(),
        }
    }

    fn spawn_loop(&self) {
        let running = Arc::clone(&self.running);
        let stages = Arc::clone(&self.stages);
        let cycles = Arc::clone(&self.cycles);
        let last_cycle = Arc::clone(&self.last_cycle);
        let delay = self.delay;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Pipeline loop started");
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                match stages.run_cycle().await {
                    Ok(report) => {
                        cycles.fetch_add(1, Ordering::Relaxed);
                        *last_cycle.write().await = Some(report);
                    }
                    Err(e) => error!("Pipeline cycle failed: {}", e),
                }

                let pause = jittered_delay(delay);
                debug!(pause_secs = pause.as_secs_f64(), "Sleeping until next cycle");
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Pipeline loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            info!("Pipeline loop stopped");
        });
    }
}
