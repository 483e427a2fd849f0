use std::net::SocketAddr;

use crate::sql::Command;

// ── Requests ─────────────────────────────────────────────────────

/// Counter: statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "courtside_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "courtside_query_duration_seconds";

// ── Reservations ─────────────────────────────────────────────────

/// Counter: reservations written. Labels: source.
pub const RESERVATIONS_CREATED_TOTAL: &str = "courtside_reservations_created_total";

/// Counter: requests refused because an active reservation overlapped. Labels: operation.
pub const CONFLICTS_TOTAL: &str = "courtside_conflicts_total";

/// Counter: lifecycle transitions. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "courtside_transitions_total";

// ── Resources ────────────────────────────────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "courtside_connections_active";
pub const CONNECTIONS_TOTAL: &str = "courtside_connections_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "courtside_connections_rejected_total";

/// Gauge: tenants with a loaded engine.
pub const TENANTS_ACTIVE: &str = "courtside_tenants_active";

pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtside_wal_flush_duration_seconds";

/// Histogram: records per group commit.
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtside_wal_flush_batch_size";

pub const WAL_COMPACTIONS_TOTAL: &str = "courtside_wal_compactions_total";

/// Install the Prometheus exporter. No-op without a port.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metric label for a parsed statement.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertVenue(_) => "insert_venue",
        Command::InsertSport(_) => "insert_sport",
        Command::InsertUnit(_) => "insert_unit",
        Command::SetUnitStatus { .. } => "set_unit_status",
        Command::InsertHold { .. } => "insert_hold",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::InsertWalkIn { .. } => "insert_walk_in",
        Command::InsertBlock { .. } => "insert_block",
        Command::InsertEvent { .. } => "insert_event",
        Command::Transition { kind, .. } => kind.label(),
        Command::EditReservation { .. } => "edit_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectVenueStats { .. } => "select_venue_stats",
        Command::SelectRevenueTrend { .. } => "select_revenue_trend",
    }
}
