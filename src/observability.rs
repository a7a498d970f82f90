use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability queries. Labels: op, status.
pub const SLOT_QUERIES_TOTAL: &str = "slotwise_slot_queries_total";

/// Histogram: query latency in seconds. Labels: op.
pub const SLOT_QUERY_DURATION_SECONDS: &str = "slotwise_slot_query_duration_seconds";

/// Histogram: slots returned per `get_available_slots` call.
pub const SLOTS_RETURNED: &str = "slotwise_slots_returned";

// ── Write path ──────────────────────────────────────────────────

/// Counter: bookings accepted by the atomic check.
pub const BOOKINGS_CREATED_TOTAL: &str = "slotwise_bookings_created_total";

/// Counter: booking attempts rejected. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "slotwise_bookings_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: providers loaded in memory.
pub const PROVIDERS_ACTIVE: &str = "slotwise_providers_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an error to a short label for metrics.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::Conflict(_) => "conflict",
        EngineError::SlotUnavailable { .. } => "slot_unavailable",
        EngineError::InvalidRecord(_) => "invalid_record",
        EngineError::LimitExceeded(_) => "limit_exceeded",
    }
}

/// Count and time one query.
pub fn record_query<T>(op: &'static str, result: &Result<T, EngineError>, started: Instant) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => error_label(e),
    };
    metrics::counter!(SLOT_QUERIES_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(SLOT_QUERY_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
