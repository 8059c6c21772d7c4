use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::{Attachment, Notice, Notifier};
use crate::metrics;

/// A notice addressed to a set of chats.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub targets: Vec<i64>,
    pub notice: Notice,
    pub attachment: Option<Attachment>,
}

impl Delivery {
    pub fn new(targets: Vec<i64>, notice: Notice) -> Self {
        Self {
            targets,
            notice,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Reported when the transport could not deliver a notice.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub timestamp: DateTime<Utc>,
    pub targets: Vec<i64>,
    pub notice: Notice,
    pub error: String,
}

/// Handle for enqueueing notices.
///
/// Cheaply cloneable. Deliveries are sent through a bounded channel and
/// performed by the [`DeliveryWorker`].
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<Delivery>,
}

impl DeliveryHandle {
    pub fn new(tx: mpsc::Sender<Delivery>) -> Self {
        Self { tx }
    }

    /// Enqueue a delivery, waiting for queue space.
    ///
    /// A closed queue is logged; the caller is never failed.
    pub async fn send(&self, delivery: Delivery) {
        if delivery.targets.is_empty() {
            tracing::debug!("Skipping notice with no recipients");
            return;
        }
        if let Err(e) = self.tx.send(delivery).await {
            metrics::DELIVERIES.with_label_values(&["dropped"]).inc();
            tracing::error!("Failed to enqueue notice: {}", e);
        }
    }
}

/// Background task that performs deliveries until every handle is dropped.
pub struct DeliveryWorker {
    rx: mpsc::Receiver<Delivery>,
    notifier: Arc<dyn Notifier>,
    failures: mpsc::Sender<DeliveryFailure>,
}

impl DeliveryWorker {
    pub fn new(
        rx: mpsc::Receiver<Delivery>,
        notifier: Arc<dyn Notifier>,
        failures: mpsc::Sender<DeliveryFailure>,
    ) -> Self {
        Self {
            rx,
            notifier,
            failures,
        }
    }

    /// Run the worker. Spawn this as a background task.
    pub async fn run(mut self) {
        tracing::info!(notifier = self.notifier.name(), "Delivery worker started");

        while let Some(delivery) = self.rx.recv().await {
            let text = delivery.notice.render();
            match self
                .notifier
                .notify(&delivery.targets, &text, delivery.attachment.as_ref())
                .await
            {
                Ok(()) => {
                    metrics::DELIVERIES.with_label_values(&["sent"]).inc();
                }
                Err(e) => {
                    metrics::DELIVERIES.with_label_values(&["failed"]).inc();
                    let failure = DeliveryFailure {
                        timestamp: Utc::now(),
                        targets: delivery.targets,
                        notice: delivery.notice,
                        error: e.to_string(),
                    };
                    // Nobody listening, or listener lagging: the failure is
                    // still visible in the log.
                    if self.failures.try_send(failure).is_err() {
                        tracing::error!("Notice delivery failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Delivery worker shutting down");
    }
}

/// Create a complete delivery system.
///
/// Returns the handle (clone it to share), the worker (spawn with
/// `tokio::spawn(worker.run())`) and the receiving end of the failure
/// channel.
pub fn create_delivery_system(
    notifier: Arc<dyn Notifier>,
    buffer_size: usize,
) -> (
    DeliveryHandle,
    DeliveryWorker,
    mpsc::Receiver<DeliveryFailure>,
) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let (failure_tx, failure_rx) = mpsc::channel(buffer_size);
    let handle = DeliveryHandle::new(tx);
    let worker = DeliveryWorker::new(rx, notifier, failure_tx);
    (handle, worker, failure_rx)
}
