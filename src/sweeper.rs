use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Scheduler;

/// Background task that flips experiment statuses as the calendar advances:
/// planned experiments whose start date has arrived become running, and
/// anything past its end date becomes completed.
pub async fn run_sweeper(scheduler: Arc<Scheduler>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let today = chrono::Utc::now().date_naive();
        let due = scheduler.collect_status_transitions(today).await;
        for (id, status) in due {
            match scheduler.set_status(id, status, None).await {
                Ok(_) => info!("experiment {id} is now {status}"),
                Err(e) => {
                    // May have been cancelled since the sweep — that's fine
                    tracing::debug!("sweeper skip {id}: {e}");
                }
            }
        }
    }
}

/// Background task that rewrites the journal once enough appends have
/// accumulated since the last compaction.
pub async fn run_compactor(scheduler: Arc<Scheduler>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = match scheduler.appends_since_compact().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("compactor could not read append count: {e}");
                continue;
            }
        };
        if appends < threshold {
            continue;
        }
        match scheduler.compact().await {
            Ok(()) => info!("journal compacted ({appends} appends folded)"),
            Err(e) => tracing::warn!("journal compaction failed: {e}"),
        }
    }
}
