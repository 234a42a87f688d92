use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotd_query_duration_seconds";

/// Counter: reservation admissions. Labels: outcome (`admitted` or an error kind).
pub const ADMISSIONS_TOTAL: &str = "slotd_admissions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotd_connections_rejected_total";

/// Gauge: number of loaded tenants.
pub const TENANTS_ACTIVE: &str = "slotd_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotd_wal_flush_batch_size";

// ── Background work ─────────────────────────────────────────────

/// Counter: reservations moved to COMPLETED by the sweeper.
pub const SWEEP_COMPLETIONS_TOTAL: &str = "slotd_sweep_completions_total";

/// Counter: outbox notices dropped after the last retry.
pub const OUTBOX_FAILURES_TOTAL: &str = "slotd_outbox_failures_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SetProfile(_) => "set_profile",
        Command::SetWorkingHours { .. } => "set_working_hours",
        Command::UpsertService(_) => "upsert_service",
        Command::UpsertResource(_) => "upsert_resource",
        Command::AssignResource { .. } => "assign_resource",
        Command::UnassignResource { .. } => "unassign_resource",
        Command::CreateReservation(_) => "create_reservation",
        Command::SetStatus { .. } => "set_status",
        Command::CancelReservation { .. } => "cancel_reservation",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectFullyBookedDates { .. } => "select_fully_booked_dates",
        Command::SelectBookedRanges { .. } => "select_booked_ranges",
        Command::SelectNightCalendar { .. } => "select_night_calendar",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectServices => "select_services",
        Command::SelectResources { .. } => "select_resources",
    }
}
