use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Promote every CONFIRMED reservation that has ended to COMPLETED.
/// Returns how many were promoted by this call.
pub async fn sweep_once(engine: &Engine) -> usize {
    let now = engine.now();
    let mut completed = 0;
    for id in engine.collect_due_completions(now) {
        match engine.complete_if_due(id, now).await {
            Ok(true) => completed += 1,
            Ok(false) => debug!("sweep skip {id}: already moved on"),
            // WAL failure; the next tick retries.
            Err(e) => warn!("sweep could not complete {id}: {e}"),
        }
    }
    if completed > 0 {
        metrics::counter!(crate::observability::SWEEP_COMPLETIONS_TOTAL).increment(completed as u64);
        info!("sweep completed {completed} reservations");
    }
    completed
}

/// Periodic completion sweep for one tenant.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                sweep_once(&engine).await;
            }
        }
    }
}

/// Rewrite the WAL as a snapshot once enough appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
