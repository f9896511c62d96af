use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: appointments created.
pub const APPOINTMENTS_CREATED_TOTAL: &str = "viewslot_appointments_created_total";

/// Counter: committed status transitions. Labels: to.
pub const STATUS_CHANGES_TOTAL: &str = "viewslot_status_changes_total";

/// Counter: pending appointments cancelled by a confirm cascade.
pub const CASCADE_CANCELLATIONS_TOTAL: &str = "viewslot_cascade_cancellations_total";

/// Counter: requests rejected because the slot was taken. Labels: operation.
pub const CONFLICTS_TOTAL: &str = "viewslot_conflicts_total";

/// Counter: compare-and-commit retries after a version mismatch.
pub const COMMIT_RETRIES_TOTAL: &str = "viewslot_commit_retries_total";

/// Histogram: engine write latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "viewslot_operation_duration_seconds";

/// Counter: domain events handed to the notify hub.
pub const EVENTS_PUBLISHED_TOTAL: &str = "viewslot_events_published_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "viewslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "viewslot_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "viewslot_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
