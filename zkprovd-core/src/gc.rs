//! Garbage collector — periodic TTL sweep over the job registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use crate::registry::JobRegistry;

pub(crate) async fn run(
    registry: Arc<JobRegistry>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("stopping GC");
                    return;
                }
            }
            _ = ticker.tick() => {
                debug!("running GC");
                registry.sweep_expired().await;
            }
        }
    }
}
