//! Periodic removal of expired reports

use crate::domain::types::epoch_ms;
use crate::services::ingestion::ReportService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Compact the store every `interval` until shutdown is signalled
///
/// The first pass runs one full interval after start.
pub async fn run_compaction(
    reports: Arc<ReportService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    info!(interval_secs = %interval.as_secs(), "compaction_started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reports.compact(epoch_ms());
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("compaction_shutdown");
                    return;
                }
            }
        }
    }
}
