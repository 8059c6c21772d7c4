//! Shutdown of the background delivery tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wait up to `grace` for the delivery worker to drain, then for the
/// failure logger to see the last failures.
///
/// On timeout both tasks are aborted; the logger would otherwise wait on a
/// worker that still holds the failure sender. Returns whether the queue
/// drained in time.
pub async fn drain_deliveries(
    mut worker: JoinHandle<()>,
    failure_log: JoinHandle<()>,
    grace: Duration,
) -> bool {
    match tokio::time::timeout(grace, &mut worker).await {
        Ok(_) => {
            info!("Delivery worker stopped");
            let _ = failure_log.await;
            true
        }
        Err(_) => {
            warn!("Delivery worker did not drain in time");
            worker.abort();
            failure_log.abort();
            false
        }
    }
}
