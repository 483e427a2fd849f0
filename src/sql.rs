use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlparser::ast::{
    self, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{EventPlan, Scope, UnitSelection, WALK_IN_GUEST};
use crate::model::*;

/// Which reservations a `SELECT ... FROM reservations` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationFilter {
    Id(Ulid),
    Unit(Ulid),
    Venue(Ulid),
    Requester(Ulid),
}

/// Lifecycle moves addressed to an existing reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionKind {
    Confirm,
    Cancel,
    Payment(PaymentInfo),
    Complete,
    Override(ReservationStatus),
}

impl TransitionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransitionKind::Confirm => "confirm",
            TransitionKind::Cancel => "cancel",
            TransitionKind::Payment(_) => "payment",
            TransitionKind::Complete => "complete",
            TransitionKind::Override(_) => "override",
        }
    }
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertVenue(Venue),
    InsertSport(SportConfig),
    InsertUnit(BookableUnit),
    SetUnitStatus {
        unit_id: Ulid,
        status: UnitStatus,
    },
    InsertHold {
        id: Ulid,
        selection: UnitSelection,
        start: Ms,
        /// Absent means one slot of the unit's sport.
        end: Option<Ms>,
        returning: bool,
    },
    InsertReservation {
        id: Ulid,
        unit_id: Ulid,
        span: Span,
        returning: bool,
    },
    InsertWalkIn {
        id: Ulid,
        unit_id: Ulid,
        span: Span,
        price: Option<Cents>,
        payment: PaymentInfo,
        guest: Option<Guest>,
        returning: bool,
    },
    InsertBlock {
        id: Ulid,
        unit_id: Ulid,
        span: Span,
        reason: Option<String>,
        returning: bool,
    },
    InsertEvent {
        plan: EventPlan,
        returning: bool,
    },
    Transition {
        kind: TransitionKind,
        reservation_id: Ulid,
        returning: bool,
    },
    EditReservation {
        reservation_id: Ulid,
        patch: ReservationPatch,
        returning: bool,
    },
    DeleteReservation {
        id: Ulid,
        returning: bool,
    },
    SelectSlots {
        unit_id: Ulid,
        date: NaiveDate,
    },
    SelectReservations {
        filter: ReservationFilter,
        scope: Scope,
    },
    SelectVenueStats {
        venue_id: Ulid,
    },
    SelectRevenueTrend {
        venue_id: Ulid,
    },
}

const DEFAULT_OPENS_AT: &str = "06:00";
const DEFAULT_CLOSES_AT: &str = "23:00";
const DEFAULT_SLOT_MINUTES: u32 = 60;

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let returning = insert.returning.is_some();

    match table.as_str() {
        "venues" => {
            let row = Row::from_insert("venues", insert)?;
            let location = match (row.opt("latitude", parse_f64)?, row.opt("longitude", parse_f64)?) {
                (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
                (None, None) => None,
                _ => {
                    return Err(SqlError::InvalidValue(
                        "latitude and longitude must be given together".into(),
                    ));
                }
            };
            Ok(Command::InsertVenue(Venue {
                id: row.req("id", parse_ulid)?,
                name: row.req("name", parse_string)?,
                operator_id: row.req("operator_id", parse_ulid)?,
                location,
                opens_at: row.opt("opens_at", parse_string)?.unwrap_or_else(|| DEFAULT_OPENS_AT.into()),
                closes_at: row.opt("closes_at", parse_string)?.unwrap_or_else(|| DEFAULT_CLOSES_AT.into()),
                status: row.opt("status", parse_label)?.unwrap_or(VenueStatus::Active),
            }))
        }
        "sports" => {
            let row = Row::from_insert("sports", insert)?;
            Ok(Command::InsertSport(SportConfig {
                id: row.req("id", parse_ulid)?,
                venue_id: row.req("venue_id", parse_ulid)?,
                sport: row.req("sport", parse_string)?,
                base_price: row.req("base_price", parse_i64_expr)?,
                slot_minutes: row.opt("slot_minutes", parse_u32)?.unwrap_or(DEFAULT_SLOT_MINUTES),
                active: row.opt("active", parse_bool)?.unwrap_or(true),
            }))
        }
        "units" => {
            let row = Row::from_insert("units", insert)?;
            Ok(Command::InsertUnit(BookableUnit {
                id: row.req("id", parse_ulid)?,
                sport_id: row.req("sport_id", parse_ulid)?,
                name: row.req("name", parse_string)?,
                capacity: row.opt("capacity", parse_u32)?.unwrap_or(1),
                price_override: row.opt("price_override", parse_i64_expr)?,
                status: row.opt("status", parse_label)?.unwrap_or(UnitStatus::Active),
            }))
        }
        "unit_status" => {
            let row = Row::from_insert("unit_status", insert)?;
            Ok(Command::SetUnitStatus {
                unit_id: row.req("unit_id", parse_ulid)?,
                status: row.req("status", parse_label)?,
            })
        }
        "holds" => {
            let row = Row::from_insert("holds", insert)?;
            let selection = match (row.opt("unit_id", parse_ulid)?, row.opt("sport_id", parse_ulid)?) {
                (Some(unit), None) => UnitSelection::Unit(unit),
                (None, Some(sport)) => UnitSelection::AnyInSport(sport),
                (None, None) => return Err(SqlError::MissingColumn("holds", "unit_id")),
                (Some(_), Some(_)) => {
                    return Err(SqlError::InvalidValue(
                        "holds take either unit_id or sport_id, not both".into(),
                    ));
                }
            };
            let start = row.req("start", parse_instant)?;
            let end = row.opt("end", parse_instant)?;
            if let Some(end) = end {
                window(start, end)?;
            }
            Ok(Command::InsertHold {
                id: row.opt("id", parse_ulid)?.unwrap_or_else(Ulid::new),
                selection,
                start,
                end,
                returning,
            })
        }
        "reservations" => {
            let row = Row::from_insert("reservations", insert)?;
            Ok(Command::InsertReservation {
                id: row.opt("id", parse_ulid)?.unwrap_or_else(Ulid::new),
                unit_id: row.req("unit_id", parse_ulid)?,
                span: row.span()?,
                returning,
            })
        }
        "walk_ins" => {
            let row = Row::from_insert("walk_ins", insert)?;
            let guest_name = row.opt("guest_name", parse_string)?;
            let guest_phone = row.opt("guest_phone", parse_string)?;
            let guest = match (guest_name, guest_phone) {
                (None, None) => None,
                (name, phone) => Some(Guest {
                    name: name.unwrap_or_else(|| WALK_IN_GUEST.into()),
                    phone,
                }),
            };
            Ok(Command::InsertWalkIn {
                id: row.opt("id", parse_ulid)?.unwrap_or_else(Ulid::new),
                unit_id: row.req("unit_id", parse_ulid)?,
                span: row.span()?,
                price: row.opt("price", parse_i64_expr)?,
                payment: PaymentInfo {
                    mode: Some(row.opt("payment_mode", parse_label)?.unwrap_or(PaymentMode::Cash)),
                    status: row.opt("payment_status", parse_label)?.unwrap_or(PaymentStatus::Pending),
                },
                guest,
                returning,
            })
        }
        "blocks" => {
            let row = Row::from_insert("blocks", insert)?;
            Ok(Command::InsertBlock {
                id: row.opt("id", parse_ulid)?.unwrap_or_else(Ulid::new),
                unit_id: row.req("unit_id", parse_ulid)?,
                span: row.span()?,
                reason: row.opt("reason", parse_string)?,
                returning,
            })
        }
        "events" => {
            let row = Row::from_insert("events", insert)?;
            Ok(Command::InsertEvent {
                plan: EventPlan {
                    unit_id: row.req("unit_id", parse_ulid)?,
                    start_date: row.req("start_date", parse_date)?,
                    end_date: row.req("end_date", parse_date)?,
                    daily_start: row
                        .opt("daily_start", parse_time_of_day)?
                        .unwrap_or_else(|| on_the_hour(DEFAULT_EVENT_START_HOUR)),
                    daily_end: row
                        .opt("daily_end", parse_time_of_day)?
                        .unwrap_or_else(|| on_the_hour(DEFAULT_EVENT_END_HOUR)),
                    conflict_policy: row.opt("conflict_policy", parse_label)?,
                },
                returning,
            })
        }
        "confirmations" => transition(&Row::from_insert("confirmations", insert)?, TransitionKind::Confirm, returning),
        "cancellations" => transition(&Row::from_insert("cancellations", insert)?, TransitionKind::Cancel, returning),
        "completions" => transition(&Row::from_insert("completions", insert)?, TransitionKind::Complete, returning),
        "payments" => {
            let row = Row::from_insert("payments", insert)?;
            let payment = PaymentInfo {
                mode: row.opt("payment_mode", parse_label)?,
                status: row.opt("payment_status", parse_label)?.unwrap_or(PaymentStatus::Paid),
            };
            transition(&row, TransitionKind::Payment(payment), returning)
        }
        "status_overrides" => {
            let row = Row::from_insert("status_overrides", insert)?;
            let status = row.req("status", parse_label)?;
            transition(&row, TransitionKind::Override(status), returning)
        }
        "reservation_edits" => {
            let row = Row::from_insert("reservation_edits", insert)?;
            Ok(Command::EditReservation {
                reservation_id: row.req("reservation_id", parse_ulid)?,
                patch: ReservationPatch {
                    guest_name: row.opt("guest_name", parse_string)?,
                    guest_phone: row.opt("guest_phone", parse_string)?,
                    total_price: row.opt("total_price", parse_i64_expr)?,
                    payment_status: row.opt("payment_status", parse_label)?,
                },
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

const DEFAULT_EVENT_START_HOUR: u32 = 9;
const DEFAULT_EVENT_END_HOUR: u32 = 18;

fn on_the_hour(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn transition(row: &Row<'_>, kind: TransitionKind, returning: bool) -> Result<Command, SqlError> {
    Ok(Command::Transition {
        kind,
        reservation_id: row.req("reservation_id", parse_ulid)?,
        returning,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(&delete.selection)?;
    Ok(Command::DeleteReservation {
        id,
        returning: delete.returning.is_some(),
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    match table.as_str() {
        "slots" => {
            let filters = Row::from_filters("slots", select.selection.as_ref())?;
            Ok(Command::SelectSlots {
                unit_id: filters.filter("unit_id", parse_ulid)?,
                date: filters.filter("date", parse_date)?,
            })
        }
        "reservations" => {
            let filters = Row::from_filters("reservations", select.selection.as_ref())?;
            let candidates = [
                filters.opt("id", parse_ulid)?.map(ReservationFilter::Id),
                filters.opt("unit_id", parse_ulid)?.map(ReservationFilter::Unit),
                filters.opt("venue_id", parse_ulid)?.map(ReservationFilter::Venue),
                filters.opt("requester_id", parse_ulid)?.map(ReservationFilter::Requester),
            ];
            let mut chosen = candidates.into_iter().flatten();
            let filter = chosen
                .next()
                .ok_or(SqlError::MissingFilter("id, unit_id, venue_id or requester_id"))?;
            if chosen.next().is_some() {
                return Err(SqlError::InvalidValue(
                    "filter reservations by exactly one of id, unit_id, venue_id or requester_id".into(),
                ));
            }
            let scope = filters.opt("scope", parse_scope)?.unwrap_or_default();
            if scope != Scope::All && !matches!(filter, ReservationFilter::Requester(_)) {
                return Err(SqlError::InvalidValue("scope requires requester_id".into()));
            }
            Ok(Command::SelectReservations { filter, scope })
        }
        "venue_stats" => {
            let filters = Row::from_filters("venue_stats", select.selection.as_ref())?;
            Ok(Command::SelectVenueStats {
                venue_id: filters.filter("venue_id", parse_ulid)?,
            })
        }
        "revenue_trend" => {
            let filters = Row::from_filters("revenue_trend", select.selection.as_ref())?;
            Ok(Command::SelectRevenueTrend {
                venue_id: filters.filter("venue_id", parse_ulid)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Rows ──────────────────────────────────────────────────────

/// Values of one statement addressed by column name: the single VALUES row
/// of an INSERT, or the `col = value` conjuncts of a WHERE clause.
struct Row<'a> {
    table: &'static str,
    cells: Vec<(String, &'a Expr)>,
}

impl<'a> Row<'a> {
    fn from_insert(table: &'static str, insert: &'a ast::Insert) -> Result<Self, SqlError> {
        let values = single_values_row(insert)?;
        if insert.columns.is_empty() {
            return Err(SqlError::Parse(format!("{table}: column list required")));
        }
        if insert.columns.len() != values.len() {
            return Err(SqlError::WrongArity(table, insert.columns.len(), values.len()));
        }
        let cells = insert
            .columns
            .iter()
            .map(|c| c.value.to_lowercase())
            .zip(values.iter())
            .collect();
        Ok(Self { table, cells })
    }

    fn from_filters(table: &'static str, selection: Option<&'a Expr>) -> Result<Self, SqlError> {
        let mut cells = Vec::new();
        if let Some(selection) = selection {
            collect_equalities(selection, &mut cells)?;
        }
        Ok(Self { table, cells })
    }

    /// NULL reads as absent.
    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, expr)| *expr)
            .filter(|expr| !matches!(extract_value(expr), Some(Value::Null)))
    }

    fn opt<T>(&self, column: &str, parse: fn(&Expr) -> Result<T, SqlError>) -> Result<Option<T>, SqlError> {
        self.get(column).map(parse).transpose()
    }

    fn req<T>(&self, column: &'static str, parse: fn(&Expr) -> Result<T, SqlError>) -> Result<T, SqlError> {
        let expr = self.get(column).ok_or(SqlError::MissingColumn(self.table, column))?;
        parse(expr)
    }

    fn filter<T>(&self, column: &'static str, parse: fn(&Expr) -> Result<T, SqlError>) -> Result<T, SqlError> {
        let expr = self.get(column).ok_or(SqlError::MissingFilter(column))?;
        parse(expr)
    }

    /// The required `start` / `"end"` pair.
    fn span(&self) -> Result<Span, SqlError> {
        window(self.req("start", parse_instant)?, self.req("end", parse_instant)?)
    }
}

fn window(start: Ms, end: Ms) -> Result<Span, SqlError> {
    Span::checked(start, end).ok_or_else(|| SqlError::InvalidValue("start must be before end".into()))
}

fn collect_equalities<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_equalities(left, out)?;
            collect_equalities(right, out)
        }
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((column, right.as_ref()));
            Ok(())
        }
        Expr::Nested(inner) => collect_equalities(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn single_values_row(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::InvalidValue(format!("{v} out of u32 range")))
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    match expr {
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => Ok(-parse_f64(expr)?),
        _ => match extract_value(expr) {
            Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad number: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {expr:?}"))),
        },
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// A status, mode or policy given by its label.
fn parse_label<T: FromStr<Err = UnknownLabel>>(expr: &Expr) -> Result<T, SqlError> {
    parse_string(expr)?
        .parse()
        .map_err(|e: UnknownLabel| SqlError::InvalidValue(e.to_string()))
}

fn parse_scope(expr: &Expr) -> Result<Scope, SqlError> {
    parse_label(expr)
}

const INSTANT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// `YYYY-MM-DD HH:MM[:SS]` (space or `T`) in UTC, or Unix milliseconds.
fn parse_instant(expr: &Expr) -> Result<Ms, SqlError> {
    let Some(Value::SingleQuotedString(s)) = extract_value(expr) else {
        return parse_i64_expr(expr);
    };
    let s = s.trim();
    if let Ok(ms) = s.parse::<Ms>() {
        return Ok(ms);
    }
    INSTANT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|dt| at_date_time(dt.date(), dt.time()))
        .ok_or_else(|| SqlError::InvalidValue(format!("bad timestamp: {s}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| SqlError::InvalidValue(format!("bad date: {s}")))
}

fn parse_time_of_day(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_string(expr)?;
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| SqlError::InvalidValue(format!("bad time of day: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("{0}: missing column {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl SqlError {
    /// Malformed statements are syntax errors; well-formed ones carrying a
    /// bad value are invalid parameters.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::InvalidValue(_) => "22023",
            _ => "42601",
        }
    }
}
