use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;

use crate::common::AppState;
use crate::services::cache;

/// Drive idle timeouts on a schedule so silent devices still stop and their
/// vueltas still close.
pub async fn run_idle_sweep(state: AppState) {
    let interval_secs = state.config.sweep_interval_seconds.max(1);
    tracing::info!(
        interval_secs,
        idle_timeout_secs = state.config.tracking.idle_timeout_seconds,
        "Starting idle sweep scheduler"
    );

    let mut ticker = interval(Duration::from_secs(interval_secs));

    // First tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

/// One sweep pass. Cached history of devices whose vueltas closed is dropped.
pub async fn sweep_once(state: &AppState) {
    tracing::debug!("Running idle sweep...");
    let report = state.registry.sweep(Utc::now()).await;

    let touched: BTreeSet<_> = report.closed.iter().map(|v| v.device_id).collect();
    for device_id in &touched {
        cache::invalidate_device(state, *device_id).await;
    }

    if !report.stopped.is_empty() || !report.closed.is_empty() {
        tracing::info!(
            stopped = report.stopped.len(),
            closed = report.closed.len(),
            "Idle sweep applied"
        );
    }
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "Idle sweep left devices unchanged");
    }
}
