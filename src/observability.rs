use std::net::SocketAddr;

// ── Operation metrics ────────────────────────────────────────────

/// Counter: total scheduler operations. Labels: op, status.
pub const OPS_TOTAL: &str = "expsched_ops_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OP_DURATION_SECONDS: &str = "expsched_op_duration_seconds";

// ── Conflict oracle ──────────────────────────────────────────────

/// Counter: oracle consultations. Labels: verdict (conflict, clear, degraded).
pub const ORACLE_CALLS_TOTAL: &str = "expsched_oracle_calls_total";

/// Histogram: oracle round-trip latency in seconds.
pub const ORACLE_DURATION_SECONDS: &str = "expsched_oracle_duration_seconds";

// ── Schedule and journal internals ───────────────────────────────

/// Gauge: experiments currently in the schedule.
pub const EXPERIMENTS_ACTIVE: &str = "expsched_experiments_active";

/// Counter: gap searches served.
pub const GAP_SEARCHES_TOTAL: &str = "expsched_gap_searches_total";

/// Counter: calendar mirror calls. Labels: status (synced, failed).
pub const CALENDAR_SYNCS_TOTAL: &str = "expsched_calendar_syncs_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "expsched_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "expsched_journal_flush_batch_size";

/// Start the Prometheus scrape endpoint, or do nothing when no port is
/// configured.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("Prometheus exporter failed to start");
    tracing::info!("serving metrics at http://0.0.0.0:{port}/metrics");
}
