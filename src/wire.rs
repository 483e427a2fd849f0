use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;

use crate::auth::{CourtsideAuthSource, parse_actor};
use crate::engine::{
    BlockRequest, BookingRequest, Engine, EngineError, HoldRequest, UnitSelection, VenueStats, WalkInRequest,
};
use crate::model::*;
use crate::observability;
use crate::slots::SlotAvailability;
use crate::sql::{self, Command, ReservationFilter, SqlError, TransitionKind};
use crate::tenant::TenantManager;

pub struct CourtsideHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<CourtsideQueryParser>,
}

impl CourtsideHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(CourtsideQueryParser),
        }
    }

    /// The tenant is the database name; the actor is the login user.
    fn resolve_session<C: ClientInfo>(&self, client: &C) -> PgWireResult<(Arc<Engine>, Actor)> {
        let user = client.metadata().get("user").cloned().unwrap_or_default();
        let actor = parse_actor(&user).ok_or_else(|| {
            user_error(
                "28000",
                format!("login user must be <role>:<ulid>, got {user:?}"),
            )
        })?;
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        let engine = self
            .tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))?;
        Ok((engine, actor))
    }

    async fn execute(&self, engine: &Engine, actor: Actor, cmd: Command) -> PgWireResult<Response> {
        let command = observability::command_label(&cmd);
        let started = Instant::now();
        let result = execute_command(engine, actor, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => command, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => command)
            .record(started.elapsed().as_secs_f64());
        result.map_err(engine_err)
    }
}

async fn execute_command(engine: &Engine, actor: Actor, cmd: Command) -> Result<Response, EngineError> {
    match cmd {
        Command::InsertVenue(venue) => {
            engine.register_venue(venue, actor).await?;
            Ok(inserted(1))
        }
        Command::InsertSport(sport) => {
            engine.register_sport(sport, actor).await?;
            Ok(inserted(1))
        }
        Command::InsertUnit(unit) => {
            engine.register_unit(unit, actor).await?;
            Ok(inserted(1))
        }
        Command::SetUnitStatus { unit_id, status } => {
            engine.set_unit_status(unit_id, status, actor).await?;
            Ok(inserted(1))
        }
        Command::InsertHold {
            id,
            selection,
            start,
            end,
            returning,
        } => {
            let span = hold_span(engine, &selection, start, end)?;
            let receipt = engine
                .hold(HoldRequest {
                    id,
                    selection,
                    span,
                    requester: actor.id,
                })
                .await?;
            if returning {
                Ok(hold_receipt_rows(&receipt))
            } else {
                Ok(inserted(1))
            }
        }
        Command::InsertReservation {
            id,
            unit_id,
            span,
            returning,
        } => {
            let reservation = engine
                .request(BookingRequest {
                    id,
                    unit_id,
                    span,
                    requester: actor.id,
                })
                .await?;
            Ok(affected("INSERT", vec![reservation], returning))
        }
        Command::InsertWalkIn {
            id,
            unit_id,
            span,
            price,
            payment,
            guest,
            returning,
        } => {
            let req = WalkInRequest {
                id,
                unit_id,
                span,
                price,
                payment,
                guest,
            };
            let reservation = engine.create_walk_in(req, actor).await?;
            Ok(affected("INSERT", vec![reservation], returning))
        }
        Command::InsertBlock {
            id,
            unit_id,
            span,
            reason,
            returning,
        } => {
            let reservation = engine
                .block(
                    BlockRequest {
                        id,
                        unit_id,
                        span,
                        reason,
                    },
                    actor,
                )
                .await?;
            Ok(affected("INSERT", vec![reservation], returning))
        }
        Command::InsertEvent { plan, returning } => {
            let reservations = engine.plan_event(plan, actor).await?;
            Ok(affected("INSERT", reservations, returning))
        }
        Command::Transition {
            kind,
            reservation_id: id,
            returning,
        } => {
            let reservation = match kind {
                TransitionKind::Confirm => engine.confirm(id, actor).await?,
                TransitionKind::Cancel => engine.cancel(id, actor).await?,
                TransitionKind::Payment(payment) => engine.submit_payment(id, actor, payment).await?,
                TransitionKind::Complete => engine.complete(id, actor).await?,
                TransitionKind::Override(to) => engine.override_status(id, actor, to).await?,
            };
            Ok(affected("INSERT", vec![reservation], returning))
        }
        Command::EditReservation {
            reservation_id,
            patch,
            returning,
        } => {
            let reservation = engine.update_details(reservation_id, actor, patch).await?;
            Ok(affected("INSERT", vec![reservation], returning))
        }
        Command::DeleteReservation { id, returning } => {
            let removed = engine.remove(id, actor).await?;
            Ok(affected("DELETE", vec![removed], returning))
        }
        Command::SelectSlots { unit_id, date } => {
            let slots = engine.slots(unit_id, date).await?;
            Ok(slot_rows(&slots))
        }
        Command::SelectReservations { filter, scope } => {
            let reservations = match filter {
                ReservationFilter::Id(id) => vec![engine.get(id).await?],
                ReservationFilter::Unit(unit_id) => engine.reservations_for_unit(unit_id).await?,
                ReservationFilter::Venue(venue_id) => engine.reservations_for_venue(venue_id).await?,
                ReservationFilter::Requester(requester) => {
                    engine.reservations_for_requester(requester, scope).await
                }
            };
            Ok(reservation_rows(&reservations))
        }
        Command::SelectVenueStats { venue_id } => {
            let stats = engine.venue_stats(venue_id, actor).await?;
            Ok(venue_stats_rows(&stats))
        }
        Command::SelectRevenueTrend { venue_id } => {
            let stats = engine.venue_stats(venue_id, actor).await?;
            Ok(revenue_trend_rows(&stats))
        }
    }
}

/// A hold without `end` covers one slot of the unit's sport.
fn hold_span(engine: &Engine, selection: &UnitSelection, start: Ms, end: Option<Ms>) -> Result<Span, EngineError> {
    let end = match end {
        Some(end) => end,
        None => {
            let slot_ms = match selection {
                UnitSelection::Unit(id) => engine.unit(id).ok_or(EngineError::NotFound(*id))?.slot_ms(),
                UnitSelection::AnyInSport(id) => {
                    let sport = engine.catalog().sport(id).ok_or(EngineError::NotFound(*id))?;
                    Ms::from(sport.slot_minutes) * MS_PER_MINUTE
                }
            };
            start.saturating_add(slot_ms)
        }
    };
    Span::checked(start, end).ok_or_else(|| EngineError::validation("start must be before end"))
}

fn inserted(rows: usize) -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(rows))
}

/// Command tag, or the written rows when the statement asked for `RETURNING`.
fn affected(tag: &str, reservations: Vec<Reservation>, returning: bool) -> Response {
    if returning {
        reservation_rows(&reservations)
    } else {
        Response::Execution(Tag::new(tag).with_rows(reservations.len()))
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn slot_schema() -> Vec<FieldInfo> {
    vec![
        text_field("slot_id"),
        text_field("time_label"),
        text_field("status"),
        int_field("price"),
        text_field("start_iso"),
        text_field("end_iso"),
    ]
}

fn reservation_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("unit_id"),
        text_field("venue_id"),
        text_field("requester_id"),
        text_field("start_iso"),
        text_field("end_iso"),
        text_field("status"),
        text_field("payment_status"),
        text_field("source"),
        int_field("total_price"),
        text_field("guest_name"),
        text_field("note"),
    ]
}

fn hold_receipt_schema() -> Vec<FieldInfo> {
    vec![
        text_field("reservation_id"),
        text_field("unit_id"),
        text_field("assigned_unit_name"),
        int_field("expires_in_seconds"),
        text_field("expires_at"),
    ]
}

fn venue_stats_schema() -> Vec<FieldInfo> {
    vec![
        text_field("venue_id"),
        int_field("revenue_today"),
        int_field("revenue_month"),
        int_field("revenue_total"),
        int_field("bookings_today"),
        int_field("confirmed_today"),
        int_field("pending_today"),
        int_field("walk_in_today"),
        int_field("online_today"),
    ]
}

fn revenue_trend_schema() -> Vec<FieldInfo> {
    vec![text_field("date"), int_field("revenue")]
}

fn count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn slot_rows(slots: &[SlotAvailability]) -> Response {
    let schema = Arc::new(slot_schema());
    let rows: Vec<PgWireResult<_>> = slots
        .iter()
        .map(|s| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&s.slot.id)?;
            encoder.encode_field(&s.slot.label)?;
            encoder.encode_field(&s.status.to_string())?;
            encoder.encode_field(&s.slot.price)?;
            encoder.encode_field(&s.slot.start_iso)?;
            encoder.encode_field(&s.slot.end_iso)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn reservation_rows(reservations: &[Reservation]) -> Response {
    let schema = Arc::new(reservation_schema());
    let rows: Vec<PgWireResult<_>> = reservations
        .iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.unit_id.to_string())?;
            encoder.encode_field(&r.venue_id.to_string())?;
            encoder.encode_field(&r.requester.to_string())?;
            encoder.encode_field(&ms_to_iso(r.span.start))?;
            encoder.encode_field(&ms_to_iso(r.span.end))?;
            encoder.encode_field(&r.status.to_string())?;
            encoder.encode_field(&r.payment.status.to_string())?;
            encoder.encode_field(&r.source.to_string())?;
            encoder.encode_field(&r.total_price)?;
            encoder.encode_field(&r.guest.as_ref().map(|g| g.name.clone()))?;
            encoder.encode_field(&r.note)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn hold_receipt_rows(receipt: &HoldReceipt) -> Response {
    let schema = Arc::new(hold_receipt_schema());
    let rows: Vec<PgWireResult<_>> = std::iter::once(receipt)
        .map(|receipt| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&receipt.reservation.id.to_string())?;
            encoder.encode_field(&receipt.reservation.unit_id.to_string())?;
            encoder.encode_field(&receipt.unit_name)?;
            encoder.encode_field(&receipt.expires_in_seconds)?;
            encoder.encode_field(&ms_to_iso(receipt.expires_at))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn venue_stats_rows(stats: &VenueStats) -> Response {
    let schema = Arc::new(venue_stats_schema());
    let rows: Vec<PgWireResult<_>> = std::iter::once(stats)
        .map(|stats| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&stats.venue_id.to_string())?;
            encoder.encode_field(&stats.revenue_today)?;
            encoder.encode_field(&stats.revenue_month)?;
            encoder.encode_field(&stats.revenue_total)?;
            encoder.encode_field(&count(stats.bookings_today))?;
            encoder.encode_field(&count(stats.confirmed_today))?;
            encoder.encode_field(&count(stats.pending_today))?;
            encoder.encode_field(&count(stats.walk_in_today))?;
            encoder.encode_field(&count(stats.online_today))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn revenue_trend_rows(stats: &VenueStats) -> Response {
    let schema = Arc::new(revenue_trend_schema());
    let rows: Vec<PgWireResult<_>> = stats
        .revenue_trend
        .iter()
        .map(|(date, revenue)| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&date.format("%Y-%m-%d").to_string())?;
            encoder.encode_field(revenue)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Result columns a statement will produce, judged from its text so that
/// statements with unbound `$n` parameters can be described.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    let trimmed = upper.trim_start();
    if trimmed.starts_with("SELECT") {
        if upper.contains("FROM SLOTS") {
            return slot_schema();
        }
        if upper.contains("FROM RESERVATIONS") {
            return reservation_schema();
        }
        if upper.contains("FROM VENUE_STATS") {
            return venue_stats_schema();
        }
        if upper.contains("FROM REVENUE_TREND") {
            return revenue_trend_schema();
        }
    } else if upper.contains("RETURNING") {
        if upper.contains("INTO HOLDS") {
            return hold_receipt_schema();
        }
        return reservation_schema();
    }
    vec![]
}

#[async_trait]
impl SimpleQueryHandler for CourtsideHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let (engine, actor) = self.resolve_session(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        Ok(vec![self.execute(&engine, actor, cmd).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CourtsideQueryParser;

#[async_trait]
impl QueryParser for CourtsideQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CourtsideHandler {
    type Statement = String;
    type QueryParser = CourtsideQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(&self, client: &mut C, portal: &Portal<Self::Statement>, _max_rows: usize) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let (engine, actor) = self.resolve_session(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.execute(&engine, actor, cmd).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute `$1, $2, ...` with bound parameter values (text format).
/// Highest index first so `$1` can't clobber the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CourtsideFactory {
    handler: Arc<CourtsideHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<CourtsideAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CourtsideFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = CourtsideAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CourtsideHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CourtsideFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
) -> std::io::Result<()> {
    let factory = CourtsideFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "22023",
        EngineError::SlotConflict { .. } => "23P01",
        EngineError::NoAvailableUnit => "53400",
        EngineError::Unauthorized(_) => "42501",
        EngineError::PastReservation => "22008",
        EngineError::NotFound(_) => "02000",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::InvalidTransition { .. } => "55000",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), format!("{}: {e}", e.kind()))
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error(e.sqlstate(), e.to_string())
}
