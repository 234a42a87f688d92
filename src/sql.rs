use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use ulid::Ulid;

use crate::engine::{RequestedWindow, ReservationRequest};
use crate::model::*;
use crate::time::{parse_date, parse_month, parse_time, parse_timezone, parse_weekday};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SetProfile(ProfileSettings),
    SetWorkingHours {
        weekday: u8,
        hours: Option<DayHours>,
    },
    UpsertService(Service),
    UpsertResource(Resource),
    AssignResource {
        service_id: Ulid,
        resource_id: Ulid,
    },
    UnassignResource {
        service_id: Ulid,
        resource_id: Ulid,
    },
    CreateReservation(ReservationRequest),
    SetStatus {
        reservation_id: Ulid,
        status: ReservationStatus,
    },
    CancelReservation {
        id: Ulid,
    },
    SelectSlots {
        service_id: Ulid,
        date: NaiveDate,
        party_size: Option<u32>,
    },
    SelectFullyBookedDates {
        service_id: Ulid,
        month: NaiveDate,
        party_size: Option<u32>,
    },
    SelectBookedRanges {
        service_id: Ulid,
    },
    SelectNightCalendar {
        service_id: Ulid,
    },
    SelectReservations {
        service_id: Ulid,
    },
    SelectServices,
    SelectResources {
        service_id: Option<Ulid>,
    },
}

// Positional VALUES follow these column orders.
const PROFILE_COLUMNS: &[&str] = &["timezone", "exclusive", "auto_confirm"];
const WORKING_HOURS_COLUMNS: &[&str] = &["weekday", "open", "close", "closed"];
const SERVICE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "kind",
    "duration_minutes",
    "price_per_night",
    "minimum_nights",
    "minimum_order_value",
    "max_capacity",
    "requires_resource",
    "allow_resource_selection",
    "require_resource_selection",
    "check_in",
    "check_out",
];
const RESOURCE_COLUMNS: &[&str] = &["id", "kind", "name", "capacity", "active"];
const ASSIGNMENT_COLUMNS: &[&str] = &["service_id", "resource_id"];
const RESERVATION_COLUMNS: &[&str] = &[
    "id",
    "service_id",
    "date",
    "time",
    "check_out",
    "resource_id",
    "party_size",
    "name",
    "email",
    "phone",
    "notes",
];
const STATUS_COLUMNS: &[&str] = &["reservation_id", "status"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let (table, columns): (&'static str, &'static [&'static str]) = match table.as_str() {
        "profile" => ("profile", PROFILE_COLUMNS),
        "working_hours" => ("working_hours", WORKING_HOURS_COLUMNS),
        "services" => ("services", SERVICE_COLUMNS),
        "resources" => ("resources", RESOURCE_COLUMNS),
        "service_resources" => ("service_resources", ASSIGNMENT_COLUMNS),
        "reservations" => ("reservations", RESERVATION_COLUMNS),
        "reservation_status" => ("reservation_status", STATUS_COLUMNS),
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let values = extract_insert_values(insert)?;
    let row = Row::bind(table, columns, &insert.columns, &values)?;

    match table {
        "profile" => Ok(Command::SetProfile(ProfileSettings {
            timezone: match row.get("timezone") {
                Some(e) => {
                    let name = parse_string(e)?;
                    parse_timezone(&name).ok_or(SqlError::InvalidValue("timezone", name))?
                }
                None => chrono_tz::Tz::UTC,
            },
            exclusive: row.bool_or("exclusive", false)?,
            auto_confirm: row.bool_or("auto_confirm", false)?,
        })),
        "working_hours" => {
            let raw = value_text(row.required("weekday")?)?;
            let weekday = parse_weekday(&raw).ok_or(SqlError::InvalidValue("weekday", raw))?;
            let hours = if row.bool_or("closed", false)? {
                None
            } else {
                Some(DayHours {
                    open: row.time("open")?,
                    close: row.time("close")?,
                })
            };
            Ok(Command::SetWorkingHours { weekday, hours })
        }
        "services" => parse_service(&row).map(Command::UpsertService),
        "resources" => {
            let raw = parse_string(row.required("kind")?)?;
            let kind = raw.parse().map_err(|_| SqlError::InvalidValue("kind", raw))?;
            Ok(Command::UpsertResource(Resource {
                id: parse_ulid(row.required("id")?)?,
                kind,
                name: row.get("name").map(parse_string).transpose()?,
                capacity: row.get("capacity").map(parse_u32).transpose()?.unwrap_or(1),
                active: row.bool_or("active", true)?,
            }))
        }
        "service_resources" => Ok(Command::AssignResource {
            service_id: parse_ulid(row.required("service_id")?)?,
            resource_id: parse_ulid(row.required("resource_id")?)?,
        }),
        "reservations" => parse_reservation(&row).map(Command::CreateReservation),
        _ => {
            let raw = parse_string(row.required("status")?)?;
            let status = raw.parse().map_err(|_| SqlError::InvalidValue("status", raw))?;
            Ok(Command::SetStatus {
                reservation_id: parse_ulid(row.required("reservation_id")?)?,
                status,
            })
        }
    }
}

fn parse_service(row: &Row<'_>) -> Result<Service, SqlError> {
    let raw = parse_string(row.required("kind")?)?;
    let kind = raw.parse().map_err(|_| SqlError::InvalidValue("kind", raw))?;
    let mut service = Service::new(parse_ulid(row.required("id")?)?, kind);
    service.name = row.get("name").map(parse_string).transpose()?;
    if let Some(e) = row.get("duration_minutes") {
        service.duration_minutes = parse_u32(e)?;
    }
    if let Some(e) = row.get("price_per_night") {
        service.price_per_night = parse_u64(e)?;
    }
    service.stay_rule = match (row.get("minimum_nights"), row.get("minimum_order_value")) {
        (Some(_), Some(_)) => {
            return Err(SqlError::InvalidValue(
                "minimum_nights",
                "cannot be combined with minimum_order_value".into(),
            ));
        }
        (Some(n), None) => StayRule::MinimumNights(parse_u32(n)?),
        (None, Some(v)) => StayRule::MinimumOrderValue(parse_u64(v)?),
        (None, None) => StayRule::None,
    };
    if let Some(e) = row.get("max_capacity") {
        service.max_capacity = parse_u32(e)?;
    }
    service.requires_resource = row.bool_or("requires_resource", false)?;
    service.allow_resource_selection = row.bool_or("allow_resource_selection", false)?;
    service.require_resource_selection = row.bool_or("require_resource_selection", false)?;
    if row.get("check_in").is_some() {
        service.check_in = row.time("check_in")?;
    }
    if row.get("check_out").is_some() {
        service.check_out = row.time("check_out")?;
    }
    Ok(service)
}

fn parse_reservation(row: &Row<'_>) -> Result<ReservationRequest, SqlError> {
    let date = row.date("date")?;
    let window = match (row.get("time"), row.get("check_out")) {
        (Some(_), None) => RequestedWindow::Slot {
            date,
            time: row.time("time")?,
        },
        (None, Some(_)) => RequestedWindow::Nights {
            check_in: date,
            check_out: row.date("check_out")?,
        },
        (Some(_), Some(_)) => {
            return Err(SqlError::InvalidValue("time", "give either time or check_out, not both".into()));
        }
        (None, None) => return Err(SqlError::MissingColumn("reservations", "time")),
    };
    Ok(ReservationRequest {
        id: parse_ulid(row.required("id")?)?,
        service_id: parse_ulid(row.required("service_id")?)?,
        window,
        resource_id: row.get("resource_id").map(parse_ulid).transpose()?,
        party_size: row.get("party_size").map(parse_u32).transpose()?,
        customer: Customer {
            name: parse_string(row.required("name")?)?,
            email: parse_string(row.required("email")?)?,
            phone: row.get("phone").map(parse_string).transpose()?,
        },
        notes: row.get("notes").map(parse_string).transpose()?,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::from_selection(delete.selection.as_ref());

    match table.as_str() {
        "service_resources" => Ok(Command::UnassignResource {
            service_id: filters.ulid("service_id")?,
            resource_id: filters.ulid("resource_id")?,
        }),
        "reservations" => Ok(Command::CancelReservation { id: filters.ulid("id")? }),
        _ => Err(SqlError::UnknownTable(table)),
    }
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
    let filters = Filters::from_selection(select.selection.as_ref());

    match table.as_str() {
        "slots" => Ok(Command::SelectSlots {
            service_id: filters.ulid("service_id")?,
            date: filters.date("date")?,
            party_size: filters.optional_u32("party_size")?,
        }),
        "fully_booked_dates" => {
            let raw = value_text(filters.required("month")?)?;
            let month = parse_month(&raw).ok_or(SqlError::InvalidValue("month", raw))?;
            Ok(Command::SelectFullyBookedDates {
                service_id: filters.ulid("service_id")?,
                month,
                party_size: filters.optional_u32("party_size")?,
            })
        }
        "booked_ranges" => Ok(Command::SelectBookedRanges {
            service_id: filters.ulid("service_id")?,
        }),
        "night_calendar" => Ok(Command::SelectNightCalendar {
            service_id: filters.ulid("service_id")?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            service_id: filters.ulid("service_id")?,
        }),
        "services" => Ok(Command::SelectServices),
        "resources" => Ok(Command::SelectResources {
            service_id: filters.get("service_id").map(parse_ulid).transpose()?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Rows and filters ──────────────────────────────────────────

/// One VALUES row keyed by column name. NULL reads as absent.
struct Row<'a> {
    table: &'static str,
    values: HashMap<&'static str, &'a Expr>,
}

impl<'a> Row<'a> {
    fn bind(
        table: &'static str,
        columns: &'static [&'static str],
        named: &[ast::Ident],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let mut bound = HashMap::with_capacity(values.len());
        if named.is_empty() {
            if values.len() > columns.len() {
                return Err(SqlError::WrongArity(table, columns.len(), values.len()));
            }
            bound.extend(columns.iter().copied().zip(values.iter()));
        } else {
            if named.len() != values.len() {
                return Err(SqlError::WrongArity(table, named.len(), values.len()));
            }
            for (ident, expr) in named.iter().zip(values) {
                let name = ident.value.to_lowercase();
                let Some(col) = columns.iter().copied().find(|c| *c == name) else {
                    return Err(SqlError::UnknownColumn(table, name));
                };
                bound.insert(col, expr);
            }
        }
        Ok(Self { table, values: bound })
    }

    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.values.get(col).copied().filter(|e| !is_null(e))
    }

    fn required(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(self.table, col))
    }

    fn bool_or(&self, col: &str, default: bool) -> Result<bool, SqlError> {
        self.get(col).map(parse_bool).transpose().map(|b| b.unwrap_or(default))
    }

    fn time(&self, col: &'static str) -> Result<NaiveTime, SqlError> {
        let raw = parse_string(self.required(col)?)?;
        parse_time(&raw).ok_or(SqlError::InvalidValue(col, raw))
    }

    fn date(&self, col: &'static str) -> Result<NaiveDate, SqlError> {
        let raw = parse_string(self.required(col)?)?;
        parse_date(&raw).ok_or(SqlError::InvalidValue(col, raw))
    }
}

/// `col = value` terms of a WHERE clause joined by AND. Other predicates are ignored.
struct Filters<'a> {
    terms: HashMap<String, &'a Expr>,
}

impl<'a> Filters<'a> {
    fn from_selection(selection: Option<&'a Expr>) -> Self {
        let mut terms = HashMap::new();
        if let Some(expr) = selection {
            collect_eq_terms(expr, &mut terms);
        }
        Self { terms }
    }

    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.terms.get(col).copied()
    }

    fn required(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingFilter(col))
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.required(col)?)
    }

    fn date(&self, col: &'static str) -> Result<NaiveDate, SqlError> {
        let raw = value_text(self.required(col)?)?;
        parse_date(&raw).ok_or(SqlError::InvalidValue(col, raw))
    }

    fn optional_u32(&self, col: &str) -> Result<Option<u32>, SqlError> {
        self.get(col).map(parse_u32).transpose()
    }
}

fn collect_eq_terms<'a>(expr: &'a Expr, terms: &mut HashMap<String, &'a Expr>) {
    match expr {
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            collect_eq_terms(left, terms);
            collect_eq_terms(right, terms);
        }
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            if let Some(col) = expr_column_name(left) {
                terms.insert(col, right);
            }
        }
        Expr::Nested(inner) => collect_eq_terms(inner, terms),
        _ => {}
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
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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

/// The single VALUES row of an INSERT.
fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
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

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// String or bare number, as text. Weekdays and months accept either.
fn value_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string or number, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = value_text(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID {s}: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp { op: ast::UnaryOperator::Minus, expr } = expr {
        return Ok(-parse_i64(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
        Some(other) => Err(SqlError::Parse(format!("expected number, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u64 range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "on" | "1" => Ok(true),
            "false" | "f" | "no" | "off" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(other) => Err(SqlError::Parse(format!("expected bool, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: unknown column {1}")]
    UnknownColumn(&'static str, String),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("{0}: missing value for {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("invalid {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn id() -> Ulid {
        Ulid::from_string(ID).unwrap()
    }

    fn other() -> Ulid {
        Ulid::from_string(OTHER).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn profile_named_and_positional() {
        let named = parse_sql(
            "INSERT INTO profile (auto_confirm, timezone) VALUES (true, 'Europe/Vienna')",
        )
        .unwrap();
        assert_eq!(
            named,
            Command::SetProfile(ProfileSettings {
                timezone: chrono_tz::Europe::Vienna,
                exclusive: false,
                auto_confirm: true,
            })
        );

        let positional = parse_sql("INSERT INTO profile VALUES ('UTC', true)").unwrap();
        assert_eq!(
            positional,
            Command::SetProfile(ProfileSettings {
                timezone: chrono_tz::Tz::UTC,
                exclusive: true,
                auto_confirm: false,
            })
        );
    }

    #[test]
    fn profile_rejects_unknown_zone() {
        let err = parse_sql("INSERT INTO profile (timezone) VALUES ('Mars/Olympus')").unwrap_err();
        assert!(matches!(err, SqlError::InvalidValue("timezone", _)));
    }

    #[test]
    fn working_hours_open_and_closed() {
        let open = parse_sql("INSERT INTO working_hours (weekday, open, close) VALUES ('tue', '08:30', '17:00')").unwrap();
        assert_eq!(
            open,
            Command::SetWorkingHours {
                weekday: 1,
                hours: Some(DayHours { open: hm(8, 30), close: hm(17, 0) }),
            }
        );

        let closed = parse_sql("INSERT INTO working_hours (weekday, closed) VALUES (6, true)").unwrap();
        assert_eq!(closed, Command::SetWorkingHours { weekday: 6, hours: None });

        let missing = parse_sql("INSERT INTO working_hours (weekday, open) VALUES (2, '09:00')").unwrap_err();
        assert!(matches!(missing, SqlError::MissingColumn("working_hours", "close")));
    }

    #[test]
    fn service_with_stay_rule_and_defaults() {
        let sql = format!(
            "INSERT INTO services (id, name, kind, price_per_night, minimum_nights) \
             VALUES ('{ID}', 'Lake cabin', 'night_range', 9000, 3)"
        );
        let Command::UpsertService(service) = parse_sql(&sql).unwrap() else {
            panic!("expected UpsertService");
        };
        assert_eq!(service.id, id());
        assert_eq!(service.name.as_deref(), Some("Lake cabin"));
        assert_eq!(service.kind, ServiceKind::NightRange);
        assert_eq!(service.price_per_night, 9000);
        assert_eq!(service.stay_rule, StayRule::MinimumNights(3));
        assert_eq!(service.check_in, hm(14, 0));
        assert_eq!(service.check_out, hm(10, 0));
    }

    #[test]
    fn service_rejects_both_stay_rules() {
        let sql = format!(
            "INSERT INTO services (id, kind, minimum_nights, minimum_order_value) VALUES ('{ID}', 'night_range', 2, 500)"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::InvalidValue("minimum_nights", _))));
    }

    #[test]
    fn service_null_reads_as_absent() {
        let sql = format!("INSERT INTO services (id, kind, name, duration_minutes) VALUES ('{ID}', 'table', NULL, 90)");
        let Command::UpsertService(service) = parse_sql(&sql).unwrap() else {
            panic!("expected UpsertService");
        };
        assert_eq!(service.name, None);
        assert_eq!(service.duration_minutes, 90);
    }

    #[test]
    fn resource_positional() {
        let sql = format!("INSERT INTO resources VALUES ('{ID}', 'table', 'Window 4', 6)");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpsertResource(Resource {
                id: id(),
                kind: ResourceKind::Table,
                name: Some("Window 4".into()),
                capacity: 6,
                active: true,
            })
        );
    }

    #[test]
    fn assign_and_unassign() {
        let sql = format!("INSERT INTO service_resources (resource_id, service_id) VALUES ('{OTHER}', '{ID}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::AssignResource { service_id: id(), resource_id: other() }
        );

        let sql = format!("DELETE FROM service_resources WHERE service_id = '{ID}' AND resource_id = '{OTHER}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UnassignResource { service_id: id(), resource_id: other() }
        );
    }

    #[test]
    fn slot_reservation() {
        let sql = format!(
            "INSERT INTO reservations (id, service_id, date, time, party_size, name, email) \
             VALUES ('{ID}', '{OTHER}', '2024-06-01', '19:30', 4, 'Ada', 'ada@example.com')"
        );
        let Command::CreateReservation(req) = parse_sql(&sql).unwrap() else {
            panic!("expected CreateReservation");
        };
        assert_eq!(req.id, id());
        assert_eq!(req.service_id, other());
        assert_eq!(req.window, RequestedWindow::Slot { date: d(2024, 6, 1), time: hm(19, 30) });
        assert_eq!(req.party_size, Some(4));
        assert_eq!(req.resource_id, None);
        assert_eq!(req.customer.email, "ada@example.com");
    }

    #[test]
    fn night_reservation() {
        let sql = format!(
            "INSERT INTO reservations (id, service_id, date, check_out, name, email, notes) \
             VALUES ('{ID}', '{OTHER}', '2024-06-05', '2024-06-08', 'Ada', 'ada@example.com', 'late arrival')"
        );
        let Command::CreateReservation(req) = parse_sql(&sql).unwrap() else {
            panic!("expected CreateReservation");
        };
        assert_eq!(
            req.window,
            RequestedWindow::Nights { check_in: d(2024, 6, 5), check_out: d(2024, 6, 8) }
        );
        assert_eq!(req.notes.as_deref(), Some("late arrival"));
    }

    #[test]
    fn reservation_needs_exactly_one_window_shape() {
        let neither = format!(
            "INSERT INTO reservations (id, service_id, date, name, email) VALUES ('{ID}', '{OTHER}', '2024-06-05', 'A', 'a@b')"
        );
        assert!(matches!(parse_sql(&neither), Err(SqlError::MissingColumn("reservations", "time"))));

        let both = format!(
            "INSERT INTO reservations (id, service_id, date, time, check_out, name, email) \
             VALUES ('{ID}', '{OTHER}', '2024-06-05', '10:00', '2024-06-06', 'A', 'a@b')"
        );
        assert!(matches!(parse_sql(&both), Err(SqlError::InvalidValue("time", _))));
    }

    #[test]
    fn status_change_and_cancel() {
        let sql = format!("INSERT INTO reservation_status (reservation_id, status) VALUES ('{ID}', 'confirmed')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SetStatus { reservation_id: id(), status: ReservationStatus::Confirmed }
        );

        let sql = format!("DELETE FROM reservations WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::CancelReservation { id: id() });
    }

    #[test]
    fn select_slots() {
        let sql = format!("SELECT * FROM slots WHERE service_id = '{ID}' AND date = '2024-06-01' AND party_size = 3");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectSlots { service_id: id(), date: d(2024, 6, 1), party_size: Some(3) }
        );
    }

    #[test]
    fn select_fully_booked_dates() {
        let sql = format!("SELECT * FROM fully_booked_dates WHERE service_id = '{ID}' AND month = '2024-06'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectFullyBookedDates { service_id: id(), month: d(2024, 6, 1), party_size: None }
        );
    }

    #[test]
    fn select_listings() {
        assert_eq!(parse_sql("SELECT * FROM services").unwrap(), Command::SelectServices);
        assert_eq!(
            parse_sql("SELECT * FROM resources").unwrap(),
            Command::SelectResources { service_id: None }
        );
        let sql = format!("SELECT * FROM resources WHERE service_id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectResources { service_id: Some(id()) }
        );
        let sql = format!("SELECT * FROM night_calendar WHERE service_id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::SelectNightCalendar { service_id: id() });
        let sql = format!("SELECT * FROM booked_ranges WHERE service_id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::SelectBookedRanges { service_id: id() });
    }

    #[test]
    fn select_missing_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM reservations"),
            Err(SqlError::MissingFilter("service_id"))
        ));
    }

    #[test]
    fn unknown_table_and_column() {
        assert!(matches!(
            parse_sql(&format!("INSERT INTO foobar (id) VALUES ('{ID}')")),
            Err(SqlError::UnknownTable(_))
        ));
        assert!(matches!(
            parse_sql(&format!("INSERT INTO resources (id, colour) VALUES ('{ID}', 'red')")),
            Err(SqlError::UnknownColumn("resources", _))
        ));
    }

    #[test]
    fn arity_and_multi_row() {
        assert!(matches!(
            parse_sql("INSERT INTO service_resources VALUES ('a', 'b', 'c')"),
            Err(SqlError::WrongArity("service_resources", 2, 3))
        ));
        let sql = format!("INSERT INTO service_resources VALUES ('{ID}', '{OTHER}'), ('{OTHER}', '{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
