use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono_tz::Tz;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, command_label};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;
use crate::time::{format_instant, format_time};

// ── Auth ─────────────────────────────────────────────────────────

/// One shared cleartext password for every tenant.
#[derive(Debug)]
pub struct SharedPassword {
    password: String,
}

#[async_trait]
impl AuthSource for SharedPassword {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

// ── Result rows ──────────────────────────────────────────────────

enum Cell {
    Text(Option<String>),
    Int(Option<i64>),
    Bool(bool),
}

impl Cell {
    fn text(s: impl Into<String>) -> Self {
        Cell::Text(Some(s.into()))
    }
}

fn fields(columns: &[(&str, Type)]) -> Vec<FieldInfo> {
    columns
        .iter()
        .map(|(name, ty)| FieldInfo::new((*name).into(), None, None, ty.clone(), FieldFormat::Text))
        .collect()
}

fn slots_schema() -> Vec<FieldInfo> {
    fields(&[
        ("time", Type::VARCHAR),
        ("start", Type::VARCHAR),
        ("end", Type::VARCHAR),
        ("available", Type::BOOL),
        ("eligible_resources", Type::VARCHAR),
    ])
}

fn dates_schema() -> Vec<FieldInfo> {
    fields(&[("date", Type::VARCHAR)])
}

fn booked_ranges_schema() -> Vec<FieldInfo> {
    fields(&[
        ("reservation_id", Type::VARCHAR),
        ("start", Type::VARCHAR),
        ("end", Type::VARCHAR),
        ("check_in", Type::VARCHAR),
        ("check_out", Type::VARCHAR),
        ("status", Type::VARCHAR),
    ])
}

fn night_calendar_schema() -> Vec<FieldInfo> {
    fields(&[("date", Type::VARCHAR), ("state", Type::VARCHAR)])
}

fn reservations_schema() -> Vec<FieldInfo> {
    fields(&[
        ("id", Type::VARCHAR),
        ("service_id", Type::VARCHAR),
        ("resource_id", Type::VARCHAR),
        ("start", Type::VARCHAR),
        ("end", Type::VARCHAR),
        ("check_in", Type::VARCHAR),
        ("check_out", Type::VARCHAR),
        ("party_size", Type::INT8),
        ("status", Type::VARCHAR),
        ("name", Type::VARCHAR),
        ("email", Type::VARCHAR),
        ("phone", Type::VARCHAR),
        ("notes", Type::VARCHAR),
        ("created_at", Type::VARCHAR),
    ])
}

fn services_schema() -> Vec<FieldInfo> {
    fields(&[
        ("id", Type::VARCHAR),
        ("name", Type::VARCHAR),
        ("kind", Type::VARCHAR),
        ("duration_minutes", Type::INT8),
        ("price_per_night", Type::INT8),
        ("minimum_nights", Type::INT8),
        ("minimum_order_value", Type::INT8),
        ("max_capacity", Type::INT8),
        ("requires_resource", Type::BOOL),
        ("allow_resource_selection", Type::BOOL),
        ("require_resource_selection", Type::BOOL),
        ("check_in", Type::VARCHAR),
        ("check_out", Type::VARCHAR),
    ])
}

fn resources_schema() -> Vec<FieldInfo> {
    fields(&[
        ("id", Type::VARCHAR),
        ("kind", Type::VARCHAR),
        ("name", Type::VARCHAR),
        ("capacity", Type::INT8),
        ("active", Type::BOOL),
    ])
}

/// Result columns of a statement, judged from the table after FROM.
/// Statements that return no rows get an empty schema.
fn result_schema(stmt: &str) -> Vec<FieldInfo> {
    let lower = stmt.to_lowercase();
    if !lower.trim_start().starts_with("select") {
        return Vec::new();
    }
    let table = lower
        .split_once(" from ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(|t| t.trim_end_matches(';'))
        .unwrap_or_default();
    match table {
        "slots" => slots_schema(),
        "fully_booked_dates" => dates_schema(),
        "booked_ranges" => booked_ranges_schema(),
        "night_calendar" => night_calendar_schema(),
        "reservations" => reservations_schema(),
        "services" => services_schema(),
        "resources" => resources_schema(),
        _ => Vec::new(),
    }
}

fn rows_response(schema: Vec<FieldInfo>, rows: Vec<Vec<Cell>>) -> Response {
    let schema = Arc::new(schema);
    let encoded: Vec<PgWireResult<_>> = rows
        .into_iter()
        .map(|row| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            for cell in row {
                match cell {
                    Cell::Text(v) => encoder.encode_field(&v)?,
                    Cell::Int(v) => encoder.encode_field(&v)?,
                    Cell::Bool(v) => encoder.encode_field(&v)?,
                }
            }
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(encoded)))
}

fn int(v: impl TryInto<i64>) -> Option<i64> {
    v.try_into().ok()
}

fn reservation_row(r: &Reservation, tz: Tz) -> Vec<Cell> {
    vec![
        Cell::text(r.id.to_string()),
        Cell::text(r.service_id.to_string()),
        Cell::Text(r.resource_id.map(|id| id.to_string())),
        Cell::text(format_instant(r.span.start, tz)),
        Cell::text(format_instant(r.span.end, tz)),
        Cell::Text(r.stay.map(|s| s.check_in.to_string())),
        Cell::Text(r.stay.map(|s| s.check_out.to_string())),
        Cell::Int(r.party_size.and_then(int)),
        Cell::text(r.status.as_str()),
        Cell::text(r.customer.name.clone()),
        Cell::text(r.customer.email.clone()),
        Cell::Text(r.customer.phone.clone()),
        Cell::Text(r.notes.clone()),
        Cell::text(format_instant(r.created_at, tz)),
    ]
}

fn service_row(s: &Service) -> Vec<Cell> {
    let (min_nights, min_value) = match s.stay_rule {
        StayRule::None => (None, None),
        StayRule::MinimumNights(n) => (int(n), None),
        StayRule::MinimumOrderValue(v) => (None, int(v)),
    };
    vec![
        Cell::text(s.id.to_string()),
        Cell::Text(s.name.clone()),
        Cell::text(s.kind.as_str()),
        Cell::Int(int(s.duration_minutes)),
        Cell::Int(int(s.price_per_night)),
        Cell::Int(min_nights),
        Cell::Int(min_value),
        Cell::Int(int(s.max_capacity)),
        Cell::Bool(s.requires_resource),
        Cell::Bool(s.allow_resource_selection),
        Cell::Bool(s.require_resource_selection),
        Cell::text(format_time(s.check_in)),
        Cell::text(format_time(s.check_out)),
    ]
}

fn resource_row(r: &Resource) -> Vec<Cell> {
    vec![
        Cell::text(r.id.to_string()),
        Cell::text(r.kind.as_str()),
        Cell::Text(r.name.clone()),
        Cell::Int(int(r.capacity)),
        Cell::Bool(r.active),
    ]
}

// ── Handler ──────────────────────────────────────────────────────

pub struct SlotdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<SlotdQueryParser>,
}

impl SlotdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(SlotdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, engine: &Engine, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Response> {
        let inserted = || Response::Execution(Tag::new("INSERT").with_rows(1));
        let deleted = || Response::Execution(Tag::new("DELETE").with_rows(1));
        match cmd {
            Command::SetProfile(settings) => {
                engine.set_profile_settings(settings).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::SetWorkingHours { weekday, hours } => {
                engine.set_working_hours(weekday, hours).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::UpsertService(service) => {
                engine.upsert_service(service).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::UpsertResource(resource) => {
                engine.upsert_resource(resource).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::AssignResource { service_id, resource_id } => {
                engine
                    .assign_resource(service_id, resource_id)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted())
            }
            Command::UnassignResource { service_id, resource_id } => {
                engine
                    .unassign_resource(service_id, resource_id)
                    .await
                    .map_err(engine_err)?;
                Ok(deleted())
            }
            Command::CreateReservation(req) => {
                engine.create_reservation(req).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::SetStatus { reservation_id, status } => {
                engine
                    .update_reservation_status(reservation_id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted())
            }
            Command::CancelReservation { id } => {
                engine.cancel_reservation(id).await.map_err(engine_err)?;
                Ok(deleted())
            }
            Command::SelectSlots { service_id, date, party_size } => {
                let plan = engine
                    .get_slots(service_id, date, party_size)
                    .await
                    .map_err(engine_err)?;
                let tz = engine.profile_state().await.settings.timezone;
                let rows = plan
                    .slots()
                    .map(|slot| {
                        let eligible: Vec<String> =
                            slot.eligible_resources.iter().map(|id| id.to_string()).collect();
                        vec![
                            Cell::text(format_time(slot.time)),
                            Cell::text(format_instant(slot.span.start, tz)),
                            Cell::text(format_instant(slot.span.end, tz)),
                            Cell::Bool(slot.available),
                            Cell::text(eligible.join(",")),
                        ]
                    })
                    .collect();
                Ok(rows_response(slots_schema(), rows))
            }
            Command::SelectFullyBookedDates { service_id, month, party_size } => {
                let dates = engine
                    .get_fully_booked_dates(service_id, month, party_size)
                    .await
                    .map_err(engine_err)?;
                let rows = dates.into_iter().map(|d| vec![Cell::text(d.to_string())]).collect();
                Ok(rows_response(dates_schema(), rows))
            }
            Command::SelectBookedRanges { service_id } => {
                let ranges = engine.get_booked_ranges(service_id).await.map_err(engine_err)?;
                let tz = engine.profile_state().await.settings.timezone;
                let rows = ranges
                    .into_iter()
                    .map(|r| {
                        vec![
                            Cell::text(r.reservation_id.to_string()),
                            Cell::text(format_instant(r.start, tz)),
                            Cell::text(format_instant(r.end, tz)),
                            Cell::Text(r.check_in.map(|d| d.to_string())),
                            Cell::Text(r.check_out.map(|d| d.to_string())),
                            Cell::text(r.status.as_str()),
                        ]
                    })
                    .collect();
                Ok(rows_response(booked_ranges_schema(), rows))
            }
            Command::SelectNightCalendar { service_id } => {
                let days = engine.get_night_calendar(service_id).await.map_err(engine_err)?;
                let rows = days
                    .into_iter()
                    .map(|(date, day)| vec![Cell::text(date.to_string()), Cell::text(day.as_str())])
                    .collect();
                Ok(rows_response(night_calendar_schema(), rows))
            }
            Command::SelectReservations { service_id } => {
                let reservations = engine.list_reservations(service_id).await.map_err(engine_err)?;
                let tz = engine.profile_state().await.settings.timezone;
                let rows = reservations.iter().map(|r| reservation_row(r, tz)).collect();
                Ok(rows_response(reservations_schema(), rows))
            }
            Command::SelectServices => {
                let rows = engine.list_services().await.iter().map(service_row).collect();
                Ok(rows_response(services_schema(), rows))
            }
            Command::SelectResources { service_id } => {
                let resources = engine.list_resources(service_id).await.map_err(engine_err)?;
                let rows = resources.iter().map(resource_row).collect();
                Ok(rows_response(resources_schema(), rows))
            }
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotdHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        Ok(vec![self.run(&engine, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotdQueryParser;

#[async_trait]
impl QueryParser for SlotdQueryParser {
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
impl ExtendedQueryHandler for SlotdHandler {
    type Statement = String;
    type QueryParser = SlotdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(&portal.statement.statement, &portal.parameters);
        self.run(&engine, &sql).await
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

/// `$N` placeholders outside quoted literals and identifiers, as
/// (byte range, N) in statement order.
fn placeholders(sql: &str) -> Vec<(std::ops::Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            // A doubled quote closes and reopens, which leaves us inside.
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'$' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start..i, n));
                }
                continue;
            }
            None => {}
        }
        i += 1;
    }
    found
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Inline bound text parameters as quoted literals in one left-to-right
/// pass, so text inside a bound value is never read as a placeholder.
fn substitute_params(sql: &str, params: &[Option<Bytes>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut copied = 0;
    for (range, n) in placeholders(sql) {
        let Some(param) = n.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        result.push_str(&sql[copied..range.start]);
        match param {
            Some(bytes) => {
                result.push('\'');
                result.push_str(&String::from_utf8_lossy(bytes).replace('\'', "''"));
                result.push('\'');
            }
            None => result.push_str("NULL"),
        }
        copied = range.end;
    }
    result.push_str(&sql[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotdFactory {
    handler: Arc<SlotdHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<SharedPassword, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(SlotdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                SharedPassword { password },
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotdFactory {
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

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = SlotdFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// SQLSTATE for each engine rejection.
pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::SlotTaken(_) => "23P01",
        EngineError::CapacityExceeded { .. } => "53400",
        EngineError::ResourceUnavailable(..) => "P0001",
        EngineError::MissingResource => "P0002",
        EngineError::MinimumNotMet(_) => "P0003",
        EngineError::InvalidTransition { .. } => "P0004",
        EngineError::InPast => "P0005",
        EngineError::AlreadyExists(_) => "P0006",
        EngineError::NotFound(_) => "02000",
        EngineError::InvalidRequest(_) | EngineError::InvalidConfig(_) => "22023",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match &e {
        SqlError::Parse(_) | SqlError::Empty | SqlError::Unsupported(_) => "42601",
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(..) => "42703",
        _ => "22023",
    };
    user_error(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn params_counted_by_highest_index() {
        assert_eq!(count_params("SELECT * FROM services"), 0);
        assert_eq!(count_params("SELECT * FROM slots WHERE service_id = $1 AND date = $2"), 2);
        assert_eq!(count_params("INSERT INTO x VALUES ($2, $10, $1)"), 10);
        assert_eq!(count_params("price $"), 0);
    }

    #[test]
    fn params_inlined_and_quoted() {
        let sql = substitute_params(
            "INSERT INTO reservations (id, name, notes) VALUES ($1, $2, $10)",
            &[
                Some(Bytes::from_static(b"01ARZ3NDEKTSV4RRFFQ69G5FAV")),
                Some(Bytes::from_static(b"O'Brien")),
                None,
                None,
                None,
                None,
                None,
                None,
                None,
                None,
            ],
        );
        assert_eq!(
            sql,
            "INSERT INTO reservations (id, name, notes) VALUES ('01ARZ3NDEKTSV4RRFFQ69G5FAV', 'O''Brien', NULL)"
        );
    }

    #[test]
    fn placeholder_text_inside_values_is_left_alone() {
        let sql = substitute_params(
            "INSERT INTO reservations (id, notes) VALUES ($1, $2)",
            &[
                Some(Bytes::from_static(b"01ARZ3NDEKTSV4RRFFQ69G5FAV")),
                Some(Bytes::from_static(b"costs $1 extra'); DELETE FROM reservations WHERE id = '$1")),
            ],
        );
        assert_eq!(
            sql,
            "INSERT INTO reservations (id, notes) VALUES ('01ARZ3NDEKTSV4RRFFQ69G5FAV', \
             'costs $1 extra''); DELETE FROM reservations WHERE id = ''$1')"
        );
        // Still one INSERT: the parser only complains about the missing date.
        assert!(matches!(
            sql::parse_sql(&sql),
            Err(SqlError::MissingColumn("reservations", "date"))
        ));
    }

    #[test]
    fn placeholders_in_literals_are_not_params() {
        assert_eq!(count_params("SELECT * FROM slots WHERE service_id = '$3' AND date = $1"), 1);
        assert_eq!(
            substitute_params("SELECT * FROM slots WHERE date = '$1' AND service_id = $1", &[Some(Bytes::from_static(b"x"))]),
            "SELECT * FROM slots WHERE date = '$1' AND service_id = 'x'"
        );
        // Unbound index stays as written for the parser to reject.
        assert_eq!(substitute_params("VALUES ($2)", &[None]), "VALUES ($2)");
    }

    #[test]
    fn schema_follows_from_table() {
        assert_eq!(result_schema("SELECT * FROM slots WHERE service_id = $1").len(), 5);
        assert_eq!(result_schema("select * from night_calendar").len(), 2);
        assert_eq!(result_schema("SELECT * FROM resources;").len(), 5);
        assert!(result_schema("INSERT INTO services (id) VALUES ($1)").is_empty());
        assert!(result_schema("SELECT * FROM nowhere").is_empty());
    }

    #[test]
    fn rejections_have_distinct_states() {
        let errors = [
            EngineError::SlotTaken(Ulid::nil()),
            EngineError::CapacityExceeded { remaining: 2, requested: 3 },
            EngineError::ResourceUnavailable(Ulid::nil(), "inactive"),
            EngineError::MissingResource,
            EngineError::MinimumNotMet("2 nights".into()),
            EngineError::InvalidTransition {
                from: ReservationStatus::Completed,
                to: ReservationStatus::Pending,
            },
            EngineError::InPast,
            EngineError::AlreadyExists(Ulid::nil()),
            EngineError::NotFound(Ulid::nil()),
        ];
        let mut states: Vec<_> = errors.iter().map(sqlstate).collect();
        states.sort();
        states.dedup();
        assert_eq!(states.len(), errors.len());
        assert_eq!(sqlstate(&EngineError::SlotTaken(Ulid::nil())), "23P01");
        assert_eq!(sqlstate(&EngineError::InvalidRequest("x".into())), "22023");
    }
}
