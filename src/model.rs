use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type inside the engine.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Configuration ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Fixed-duration appointments, optionally bound to a worker.
    TimeSlot,
    /// Multi-night rentals with split check-in/check-out days.
    NightRange,
    /// Party reservations limited by seats or by specific tables.
    Table,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::TimeSlot => "time_slot",
            ServiceKind::NightRange => "night_range",
            ServiceKind::Table => "table",
        }
    }

    /// Resource kind a service of this kind binds to, if any.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            ServiceKind::TimeSlot => Some(ResourceKind::Worker),
            ServiceKind::Table => Some(ResourceKind::Table),
            ServiceKind::NightRange => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time_slot" | "timeslot" | "slot" => Ok(ServiceKind::TimeSlot),
            "night_range" | "nightrange" | "nights" => Ok(ServiceKind::NightRange),
            "table" => Ok(ServiceKind::Table),
            other => Err(format!("unknown service kind: {other}")),
        }
    }
}

/// Minimum-stay constraint of a night-range service. The two modes are
/// mutually exclusive, so they are one enum rather than two optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StayRule {
    None,
    MinimumNights(u32),
    /// In minor currency units, compared against `nights × price_per_night`.
    MinimumOrderValue(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: Option<String>,
    pub kind: ServiceKind,
    /// Slot length for time-slot and table services; zero for night ranges.
    pub duration_minutes: u32,
    /// Minor currency units.
    pub price_per_night: u64,
    pub stay_rule: StayRule,
    /// Seat limit for table services that don't bind to a specific table.
    pub max_capacity: u32,
    pub requires_resource: bool,
    pub allow_resource_selection: bool,
    pub require_resource_selection: bool,
    pub check_in: NaiveTime,
    pub check_out: NaiveTime,
}

pub fn default_check_in() -> NaiveTime {
    NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN)
}

pub fn default_check_out() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl Service {
    /// A service with defaults for everything but identity and kind.
    pub fn new(id: Ulid, kind: ServiceKind) -> Self {
        Self {
            id,
            name: None,
            kind,
            duration_minutes: if kind == ServiceKind::NightRange { 0 } else { 60 },
            price_per_night: 0,
            stay_rule: StayRule::None,
            max_capacity: 0,
            requires_resource: false,
            allow_resource_selection: false,
            require_resource_selection: false,
            check_in: default_check_in(),
            check_out: default_check_out(),
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.duration_minutes as Ms * MINUTE_MS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Worker,
    Table,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Worker => "worker",
            ResourceKind::Table => "table",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "worker" => Ok(ResourceKind::Worker),
            "table" => Ok(ResourceKind::Table),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// A worker or a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: Option<String>,
    /// Seats. Only meaningful for tables.
    pub capacity: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Opening hours per weekday, Monday first. `None` means closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkingHours {
    pub days: [Option<DayHours>; 7],
}

impl WorkingHours {
    pub fn for_date(&self, date: NaiveDate) -> Option<DayHours> {
        use chrono::Datelike;
        self.days[date.weekday().num_days_from_monday() as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub timezone: Tz,
    /// A booking on one service blocks the same window on every other service.
    pub exclusive: bool,
    /// New reservations start CONFIRMED instead of PENDING.
    pub auto_confirm: bool,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            exclusive: false,
            auto_confirm: false,
        }
    }
}

// ── Ledger ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Cancelled)
    }

    /// Allowed edges of the lifecycle. Self-transitions are not edges.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Confirmed, Completed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "COMPLETED" => Ok(ReservationStatus::Completed),
            "CANCELLED" | "CANCELED" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Calendar dates of a night-range stay, fixed at admission so later time zone
/// changes don't move them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub service_id: Ulid,
    pub resource_id: Option<Ulid>,
    pub span: Span,
    pub stay: Option<Stay>,
    pub party_size: Option<u32>,
    pub status: ReservationStatus,
    pub customer: Customer,
    pub notes: Option<String>,
    pub created_at: Ms,
}

impl Reservation {
    /// Cancelled reservations free their interval; every other status occupies it.
    pub fn occupies(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }
}

/// Per-service ledger: configuration plus every reservation ever admitted,
/// sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub service: Service,
    /// Eligible resources in assignment order.
    pub eligible: Vec<Ulid>,
    pub reservations: Vec<Reservation>,
}

impl ServiceState {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            eligible: Vec::new(),
            reservations: Vec::new(),
        }
    }

    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations (any status) whose span overlaps the query window.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Non-cancelled reservations overlapping the window.
    pub fn occupying(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        self.overlapping(query).filter(|r| r.occupies())
    }
}

/// One occupied interval on a resource calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub reservation_id: Ulid,
    pub service_id: Ulid,
    pub span: Span,
}

/// A worker or table with its calendar of live bookings across all services,
/// sorted by `span.start`. Cancelled reservations are removed.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub resource: Resource,
    pub bookings: Vec<Booking>,
}

impl ResourceState {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            bookings: Vec::new(),
        }
    }

    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, reservation_id: Ulid) -> Option<Booking> {
        let pos = self
            .bookings
            .iter()
            .position(|b| b.reservation_id == reservation_id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn is_free(&self, span: &Span) -> bool {
        self.overlapping(span).next().is_none()
    }
}

/// Flat event types, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProfileUpdated {
        settings: ProfileSettings,
    },
    WorkingHoursSet {
        /// 0 = Monday.
        weekday: u8,
        hours: Option<DayHours>,
    },
    ServiceCreated {
        service: Service,
    },
    ServiceUpdated {
        service: Service,
    },
    ResourceCreated {
        resource: Resource,
    },
    ResourceUpdated {
        resource: Resource,
    },
    ResourceAssigned {
        service_id: Ulid,
        resource_id: Ulid,
    },
    ResourceUnassigned {
        service_id: Ulid,
        resource_id: Ulid,
    },
    ReservationAdmitted {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: Ulid,
        service_id: Ulid,
        status: ReservationStatus,
    },
}

impl Event {
    /// Service an event is scoped to, if any.
    pub fn service_id(&self) -> Option<Ulid> {
        match self {
            Event::ServiceCreated { service } | Event::ServiceUpdated { service } => Some(service.id),
            Event::ResourceAssigned { service_id, .. }
            | Event::ResourceUnassigned { service_id, .. }
            | Event::ReservationStatusChanged { service_id, .. } => Some(*service_id),
            Event::ReservationAdmitted { reservation } => Some(reservation.service_id),
            Event::ProfileUpdated { .. }
            | Event::WorkingHoursSet { .. }
            | Event::ResourceCreated { .. }
            | Event::ResourceUpdated { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedRange {
    pub reservation_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub status: ReservationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            service_id: Ulid::nil(),
            resource_id: None,
            span: Span::new(start, end),
            stay: None,
            party_size: None,
            status,
            customer: Customer::default(),
            notes: None,
            created_at: 0,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn status_edges() {
        use ReservationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn status_parse_accepts_both_spellings() {
        assert_eq!("canceled".parse::<ReservationStatus>(), Ok(ReservationStatus::Cancelled));
        assert_eq!("Confirmed".parse::<ReservationStatus>(), Ok(ReservationStatus::Confirmed));
        assert!("done".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn reservations_stay_sorted() {
        let mut st = ServiceState::new(Service::new(Ulid::new(), ServiceKind::TimeSlot));
        st.insert_reservation(reservation(300, 400, ReservationStatus::Pending));
        st.insert_reservation(reservation(100, 200, ReservationStatus::Pending));
        st.insert_reservation(reservation(200, 300, ReservationStatus::Pending));
        let starts: Vec<Ms> = st.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn occupying_skips_cancelled() {
        let mut st = ServiceState::new(Service::new(Ulid::new(), ServiceKind::TimeSlot));
        st.insert_reservation(reservation(100, 200, ReservationStatus::Cancelled));
        st.insert_reservation(reservation(150, 250, ReservationStatus::Confirmed));
        let query = Span::new(100, 300);
        assert_eq!(st.overlapping(&query).count(), 2);
        assert_eq!(st.occupying(&query).count(), 1);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut st = ServiceState::new(Service::new(Ulid::new(), ServiceKind::TimeSlot));
        st.insert_reservation(reservation(100, 200, ReservationStatus::Pending));
        let hits: Vec<_> = st.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn resource_calendar_insert_remove() {
        let mut rs = ResourceState::new(Resource {
            id: Ulid::new(),
            kind: ResourceKind::Worker,
            name: None,
            capacity: 1,
            active: true,
        });
        let keep = Ulid::new();
        let drop = Ulid::new();
        rs.insert_booking(Booking { reservation_id: keep, service_id: Ulid::nil(), span: Span::new(500, 600) });
        rs.insert_booking(Booking { reservation_id: drop, service_id: Ulid::nil(), span: Span::new(100, 200) });
        assert!(!rs.is_free(&Span::new(150, 160)));
        assert!(rs.remove_booking(drop).is_some());
        assert!(rs.is_free(&Span::new(150, 160)));
        assert!(rs.remove_booking(drop).is_none());
        assert_eq!(rs.bookings.len(), 1);
    }

    #[test]
    fn working_hours_by_weekday() {
        let mut wh = WorkingHours::default();
        let hours = DayHours {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        wh.days[0] = Some(hours);
        // 2024-06-03 is a Monday
        assert_eq!(wh.for_date(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()), Some(hours));
        assert_eq!(wh.for_date(NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()), None);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut service = Service::new(Ulid::new(), ServiceKind::NightRange);
        service.stay_rule = StayRule::MinimumNights(3);
        let event = Event::ServiceCreated { service };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);

        let settings = Event::ProfileUpdated {
            settings: ProfileSettings {
                timezone: chrono_tz::Europe::Berlin,
                exclusive: true,
                auto_confirm: false,
            },
        };
        let bytes = bincode::serialize(&settings).unwrap();
        assert_eq!(bincode::deserialize::<Event>(&bytes).unwrap(), settings);
    }
}
