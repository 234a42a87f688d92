use chrono::{Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time::local_to_ms;

use super::availability::{DaySnapshot, NightCalendar, ResourceCalendar, SlotMode, Verdict};
use super::store::ProfileState;
use super::EngineError;

// ── Configuration checks ─────────────────────────────────

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

fn validate_name(name: &Option<String>) -> Result<(), EngineError> {
    if let Some(n) = name
        && n.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("name too long"));
        }
    Ok(())
}

pub(super) fn validate_service(service: &Service) -> Result<(), EngineError> {
    validate_name(&service.name)?;
    let bad = |msg: &str| Err(EngineError::InvalidConfig(msg.to_string()));
    match service.kind {
        ServiceKind::NightRange => {
            if service.requires_resource {
                return bad("night-range services cannot require a resource");
            }
            if service.check_out > service.check_in {
                return bad("check-out time must not be later than check-in time");
            }
            if matches!(service.stay_rule, StayRule::MinimumOrderValue(_)) && service.price_per_night == 0 {
                return bad("a minimum order value needs a nightly price");
            }
        }
        ServiceKind::TimeSlot | ServiceKind::Table => {
            if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&service.duration_minutes) {
                return bad("duration must be between 5 minutes and 24 hours");
            }
            if service.stay_rule != StayRule::None {
                return bad("stay rules apply to night-range services only");
            }
            if service.kind == ServiceKind::Table && !service.requires_resource && service.max_capacity == 0 {
                return bad("table service without specific tables needs a max capacity");
            }
        }
    }
    if (service.allow_resource_selection || service.require_resource_selection) && !service.requires_resource {
        return bad("resource selection needs a resource-bound service");
    }
    Ok(())
}

pub(super) fn validate_resource(resource: &Resource) -> Result<(), EngineError> {
    validate_name(&resource.name)?;
    if resource.kind == ResourceKind::Table {
        if resource.capacity == 0 {
            return Err(EngineError::InvalidConfig("table capacity must be positive".into()));
        }
        if resource.capacity > MAX_PARTY_SIZE {
            return Err(EngineError::LimitExceeded("table capacity too large"));
        }
    }
    Ok(())
}

pub(super) fn validate_hours(hours: &Option<DayHours>) -> Result<(), EngineError> {
    match hours {
        Some(h) if h.open >= h.close => Err(EngineError::InvalidConfig(
            "opening time must be before closing time".into(),
        )),
        _ => Ok(()),
    }
}

pub(super) fn validate_contact(customer: &Customer, notes: &Option<String>) -> Result<(), EngineError> {
    if customer.name.trim().is_empty() {
        return Err(EngineError::InvalidRequest("customer name is required".into()));
    }
    if customer.email.trim().is_empty() {
        return Err(EngineError::InvalidRequest("customer email is required".into()));
    }
    if customer.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("customer name too long"));
    }
    if customer.email.len() > MAX_CONTACT_LEN || customer.phone.as_ref().is_some_and(|p| p.len() > MAX_CONTACT_LEN) {
        return Err(EngineError::LimitExceeded("contact details too long"));
    }
    if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

// ── Snapshots ────────────────────────────────────────────

/// Inputs for a day snapshot, borrowed from whatever guards the caller holds.
/// Queries pass read guards, admission passes write guards.
pub(super) struct LedgerView<'a> {
    pub profile: &'a ProfileState,
    pub service: &'a ServiceState,
    /// Every other service of the profile. Only consulted under exclusivity.
    pub others: &'a [&'a ServiceState],
    /// Resources to consider, in eligibility order.
    pub resources: &'a [&'a ResourceState],
    pub party: u32,
    pub now: Ms,
}

/// Why a resource can't serve a request, or `Ok` if it can.
pub(super) fn resource_fit(service: &Service, rs: &ResourceState, party: u32) -> Result<(), &'static str> {
    if service.kind.resource_kind() != Some(rs.resource.kind) {
        return Err("wrong resource kind for this service");
    }
    if !rs.resource.active {
        return Err("resource is inactive");
    }
    if rs.resource.kind == ResourceKind::Table && rs.resource.capacity < party {
        return Err("table too small for party");
    }
    Ok(())
}

/// Largest active table of the right kind, when every one of them is too
/// small for `party`. `None` if some table could seat the party or none exists.
pub(super) fn oversized_party(service: &Service, resources: &[&ResourceState], party: u32) -> Option<u32> {
    if service.kind != ServiceKind::Table {
        return None;
    }
    let largest = resources
        .iter()
        .filter(|rs| resource_fit(service, rs, 0).is_ok())
        .map(|rs| rs.resource.capacity)
        .max()?;
    (largest < party).then_some(largest)
}

/// Local midnight to local midnight.
pub(super) fn day_span(date: NaiveDate, tz: chrono_tz::Tz) -> Span {
    let start = local_to_ms(date, NaiveTime::MIN, tz);
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    let end = local_to_ms(next, NaiveTime::MIN, tz);
    Span::new(start, end.max(start + 1))
}

fn bookings_of<'a>(ss: &'a ServiceState, window: &'a Span) -> impl Iterator<Item = Booking> + 'a {
    ss.occupying(window).map(|r| Booking {
        reservation_id: r.id,
        service_id: r.service_id,
        span: r.span,
    })
}

/// Reservations of other services overlapping `window`, when the profile is
/// exclusive.
pub(super) fn cross_service_blocks(view: &LedgerView<'_>, window: &Span) -> Vec<Booking> {
    if !view.profile.settings.exclusive {
        return Vec::new();
    }
    view.others
        .iter()
        .filter(|o| o.service.id != view.service.service.id)
        .flat_map(|o| bookings_of(o, window))
        .collect()
}

/// The same snapshot feeds the slot listing and admission.
pub(super) fn day_snapshot(view: &LedgerView<'_>, date: NaiveDate) -> DaySnapshot {
    let tz = view.profile.settings.timezone;
    let window = day_span(date, tz);
    let service = &view.service.service;

    let mut blocked = cross_service_blocks(view, &window);
    let mode = if service.requires_resource {
        let calendars = view
            .resources
            .iter()
            .filter(|rs| resource_fit(service, rs, view.party).is_ok())
            .map(|rs| ResourceCalendar {
                id: rs.resource.id,
                busy: rs.overlapping(&window).copied().collect(),
            })
            .collect();
        SlotMode::Resources(calendars)
    } else if service.kind == ServiceKind::Table {
        let loads = view
            .service
            .occupying(&window)
            .map(|r| {
                let b = Booking {
                    reservation_id: r.id,
                    service_id: r.service_id,
                    span: r.span,
                };
                (b, r.party_size.unwrap_or(1))
            })
            .collect();
        SlotMode::Seats {
            max_capacity: service.max_capacity,
            party: view.party,
            loads,
        }
    } else {
        blocked.extend(bookings_of(view.service, &window));
        SlotMode::Exclusive
    };
    blocked.sort_by_key(|b| b.span.start);

    DaySnapshot {
        date,
        tz,
        hours: view.profile.hours.for_date(date),
        duration: service.duration_ms(),
        now: view.now,
        blocked,
        mode,
    }
}

pub(super) fn night_calendar(ss: &ServiceState) -> NightCalendar {
    NightCalendar::from_stays(
        ss.reservations
            .iter()
            .filter(|r| r.occupies())
            .filter_map(|r| r.stay.as_ref().map(|s| (r.id, s))),
    )
}

// ── Verdicts ─────────────────────────────────────────────

/// Turn a window verdict into the admission result: the free resources on
/// success, or the typed rejection.
pub(super) fn admit_verdict(
    verdict: Verdict,
    party: u32,
    supplied: Option<Ulid>,
) -> Result<Vec<Ulid>, EngineError> {
    match verdict {
        Verdict::Free(resources) => Ok(resources),
        Verdict::Past => Err(EngineError::InPast),
        Verdict::Taken(id) => Err(EngineError::SlotTaken(id)),
        Verdict::Full { remaining } => Err(EngineError::CapacityExceeded {
            remaining,
            requested: party,
        }),
        Verdict::NoResource(blocker) => match (supplied, blocker) {
            (Some(rid), _) => Err(EngineError::ResourceUnavailable(rid, "already booked in this window")),
            (None, Some(id)) => Err(EngineError::SlotTaken(id)),
            (None, None) => Err(EngineError::InvalidConfig(
                "no eligible resource can serve this request".into(),
            )),
        },
    }
}
