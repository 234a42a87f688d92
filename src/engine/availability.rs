use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use ulid::Ulid;

use crate::model::*;
use crate::time::local_to_ms;

// ── Slot Algorithm ────────────────────────────────────────────────

/// A free/busy calendar of one eligible resource, already filtered for
/// activity and seat count.
#[derive(Debug, Clone)]
pub struct ResourceCalendar {
    pub id: Ulid,
    /// Live bookings, sorted by `span.start`.
    pub busy: Vec<Booking>,
}

/// How a candidate window is decided once the service-wide blocks are clear.
#[derive(Debug, Clone)]
pub enum SlotMode {
    /// The service itself is the exclusive unit; its own bookings are in `blocked`.
    Exclusive,
    /// Shared seat pool.
    Seats {
        max_capacity: u32,
        party: u32,
        loads: Vec<(Booking, u32)>,
    },
    /// At least one of these resources must be free.
    Resources(Vec<ResourceCalendar>),
}

/// Everything the calculator needs to decide the slots of one day, copied out
/// of the ledger under read locks.
#[derive(Debug, Clone)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub tz: Tz,
    pub hours: Option<DayHours>,
    pub duration: Ms,
    pub now: Ms,
    /// Bookings that block the window for the whole service.
    pub blocked: Vec<Booking>,
    pub mode: SlotMode,
}

/// Outcome of checking one exact window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Free; for resource-bound services, the resources free in the window,
    /// in eligibility order.
    Free(Vec<Ulid>),
    Past,
    Taken(Ulid),
    Full { remaining: u32 },
    /// No eligible resource is free; carries a booking on the first one, if any.
    NoResource(Option<Ulid>),
}

impl Verdict {
    pub fn is_free(&self) -> bool {
        matches!(self, Verdict::Free(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub time: NaiveTime,
    pub span: Span,
    pub available: bool,
    pub eligible_resources: Vec<Ulid>,
}

/// Candidate slots of a day. Cheap to build; slots are evaluated lazily by
/// [`DayPlan::slots`], which can be called again to restart.
#[derive(Debug, Clone)]
pub struct DayPlan {
    snapshot: DaySnapshot,
    open: Ms,
    close: Ms,
}

impl DayPlan {
    pub fn new(snapshot: DaySnapshot) -> Self {
        let (open, close) = match snapshot.hours {
            Some(h) if h.open < h.close && snapshot.duration > 0 => (
                local_to_ms(snapshot.date, h.open, snapshot.tz),
                local_to_ms(snapshot.date, h.close, snapshot.tz),
            ),
            _ => (0, 0),
        };
        Self {
            snapshot,
            open,
            close,
        }
    }

    pub fn slots(&self) -> SlotIter<'_> {
        SlotIter {
            plan: self,
            next_start: self.open,
        }
    }

    /// True if `span` is exactly one of the day's candidate windows.
    pub fn is_candidate(&self, span: &Span) -> bool {
        let d = self.snapshot.duration;
        d > 0
            && span.duration_ms() == d
            && span.start >= self.open
            && span.end <= self.close
            && (span.start - self.open) % d == 0
    }

    /// Decide one window with the same rules the slot listing uses.
    pub fn evaluate(&self, span: &Span) -> Verdict {
        evaluate_window(&self.snapshot, span)
    }

    pub fn has_available_slot(&self) -> bool {
        self.slots().any(|s| s.available)
    }
}

#[derive(Debug, Clone)]
pub struct SlotIter<'a> {
    plan: &'a DayPlan,
    next_start: Ms,
}

impl Iterator for SlotIter<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let d = self.plan.snapshot.duration;
        if d <= 0 || self.next_start + d > self.plan.close {
            return None;
        }
        let span = Span::new(self.next_start, self.next_start + d);
        self.next_start += d;

        let verdict = evaluate_window(&self.plan.snapshot, &span);
        let time = crate::time::ms_to_local(span.start, self.plan.snapshot.tz).time();
        let (available, eligible_resources) = match verdict {
            Verdict::Free(resources) => (true, resources),
            _ => (false, Vec::new()),
        };
        Some(Slot {
            time,
            span,
            available,
            eligible_resources,
        })
    }
}

/// The single availability rule for time-slot and table windows.
pub fn evaluate_window(snapshot: &DaySnapshot, span: &Span) -> Verdict {
    if span.start < snapshot.now {
        return Verdict::Past;
    }
    if let Some(b) = first_overlap(&snapshot.blocked, span) {
        return Verdict::Taken(b.reservation_id);
    }
    match &snapshot.mode {
        SlotMode::Exclusive => Verdict::Free(Vec::new()),
        SlotMode::Seats {
            max_capacity,
            party,
            loads,
        } => {
            let booked = peak_load(loads, span);
            let remaining = max_capacity.saturating_sub(booked);
            if *party <= remaining {
                Verdict::Free(Vec::new())
            } else {
                Verdict::Full { remaining }
            }
        }
        SlotMode::Resources(calendars) => {
            let free: Vec<Ulid> = calendars
                .iter()
                .filter(|c| first_overlap(&c.busy, span).is_none())
                .map(|c| c.id)
                .collect();
            if free.is_empty() {
                let blocker = calendars
                    .iter()
                    .find_map(|c| first_overlap(&c.busy, span))
                    .map(|b| b.reservation_id);
                Verdict::NoResource(blocker)
            } else {
                Verdict::Free(free)
            }
        }
    }
}

/// First booking in a start-sorted list overlapping `span`.
pub fn first_overlap<'a>(sorted: &'a [Booking], span: &Span) -> Option<&'a Booking> {
    let right_bound = sorted.partition_point(|b| b.span.start < span.end);
    sorted[..right_bound].iter().find(|b| b.span.end > span.start)
}

/// Sweep-line: the highest concurrent seat load inside `window`.
pub fn peak_load(loads: &[(Booking, u32)], window: &Span) -> u32 {
    let mut events: Vec<(Ms, i64)> = Vec::new();
    for (b, seats) in loads {
        if !b.span.overlaps(window) {
            continue;
        }
        events.push((b.span.start.max(window.start), *seats as i64));
        events.push((b.span.end.min(window.end), -(*seats as i64)));
    }
    // Ends sort before starts at the same instant: half-open intervals.
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut load: i64 = 0;
    let mut peak: i64 = 0;
    for (_, delta) in events {
        load += delta;
        peak = peak.max(load);
    }
    peak as u32
}

// ── Night-range Algorithm ─────────────────────────────────────────

/// How a calendar date is occupied by existing stays. Mornings belong to
/// departing guests, afternoons to arriving ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightDay {
    Free,
    /// Someone checks in: the afternoon is taken, the morning is free.
    CheckInBlocked,
    /// Someone checks out: the morning is taken, the afternoon is free.
    CheckOutBlocked,
    /// One stay ends and another starts on this date.
    Turnover,
    /// Strictly inside a stay.
    FullyBooked,
}

impl NightDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            NightDay::Free => "free",
            NightDay::CheckInBlocked => "check_in_blocked",
            NightDay::CheckOutBlocked => "check_out_blocked",
            NightDay::Turnover => "turnover",
            NightDay::FullyBooked => "fully_booked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NightRejection {
    Invalid(&'static str),
    Taken(Ulid),
    MinimumNotMet(String),
}

/// Date classification derived from a service's live stays. Each set maps the
/// date to the reservation that occupies it.
#[derive(Debug, Clone, Default)]
pub struct NightCalendar {
    pub fully_booked: BTreeMap<NaiveDate, Ulid>,
    pub check_in_blocked: BTreeMap<NaiveDate, Ulid>,
    pub check_out_blocked: BTreeMap<NaiveDate, Ulid>,
}

impl NightCalendar {
    pub fn from_stays<'a>(stays: impl IntoIterator<Item = (Ulid, &'a Stay)>) -> Self {
        let mut cal = NightCalendar::default();
        for (id, stay) in stays {
            cal.check_in_blocked.insert(stay.check_in, id);
            cal.check_out_blocked.insert(stay.check_out, id);
            let mut d = stay.check_in.succ_opt();
            while let Some(day) = d {
                if day >= stay.check_out {
                    break;
                }
                cal.fully_booked.insert(day, id);
                d = day.succ_opt();
            }
        }
        cal
    }

    pub fn day(&self, date: NaiveDate) -> NightDay {
        if self.fully_booked.contains_key(&date) {
            return NightDay::FullyBooked;
        }
        match (
            self.check_in_blocked.contains_key(&date),
            self.check_out_blocked.contains_key(&date),
        ) {
            (true, true) => NightDay::Turnover,
            (true, false) => NightDay::CheckInBlocked,
            (false, true) => NightDay::CheckOutBlocked,
            (false, false) => NightDay::Free,
        }
    }

    /// Dates unusable for any role: inside a stay, or a turnover day.
    pub fn is_fully_booked(&self, date: NaiveDate) -> bool {
        matches!(self.day(date), NightDay::FullyBooked | NightDay::Turnover)
    }

    fn occupant(&self, date: NaiveDate, morning: bool, afternoon: bool) -> Option<Ulid> {
        if let Some(id) = self.fully_booked.get(&date) {
            return Some(*id);
        }
        if afternoon && let Some(id) = self.check_in_blocked.get(&date) {
            return Some(*id);
        }
        if morning && let Some(id) = self.check_out_blocked.get(&date) {
            return Some(*id);
        }
        None
    }

    /// Check a proposed `[check_in, check_out)` stay against the calendar and
    /// the service's stay rule.
    pub fn check_range(&self, service: &Service, check_in: NaiveDate, check_out: NaiveDate) -> Result<(), NightRejection> {
        if check_out <= check_in {
            return Err(NightRejection::Invalid("check-out must be after check-in"));
        }
        let nights = (check_out - check_in).num_days();
        match service.stay_rule {
            StayRule::MinimumNights(min) if nights < min as i64 => {
                return Err(NightRejection::MinimumNotMet(format!(
                    "{nights} nights booked, at least {min} required"
                )));
            }
            StayRule::MinimumOrderValue(min) => {
                let value = (nights as u64).saturating_mul(service.price_per_night);
                if value < min {
                    return Err(NightRejection::MinimumNotMet(format!(
                        "order value {value} below minimum {min}"
                    )));
                }
            }
            _ => {}
        }

        // Arrival uses the afternoon, departure the morning, and every night in
        // between the whole day.
        if let Some(id) = self.occupant(check_in, false, true) {
            return Err(NightRejection::Taken(id));
        }
        if let Some(id) = self.occupant(check_out, true, false) {
            return Err(NightRejection::Taken(id));
        }
        let mut d = check_in.succ_opt();
        while let Some(day) = d {
            if day >= check_out {
                break;
            }
            if let Some(id) = self.occupant(day, true, true) {
                return Err(NightRejection::Taken(id));
            }
            d = day.succ_opt();
        }
        Ok(())
    }
}

/// Instant span of a stay at the service's check-in/check-out clock times.
pub fn stay_span(service: &Service, stay: &Stay, tz: Tz) -> Span {
    let start = local_to_ms(stay.check_in, service.check_in, tz);
    let end = local_to_ms(stay.check_out, service.check_out, tz);
    Span::new(start, end.max(start + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            reservation_id: Ulid::new(),
            service_id: Ulid::nil(),
            span: Span::new(start, end),
        }
    }

    /// 2024-06-03, 09:00–12:00 UTC, hour slots.
    fn snapshot(mode: SlotMode, blocked: Vec<Booking>) -> DaySnapshot {
        DaySnapshot {
            date: date(2024, 6, 3),
            tz: Tz::UTC,
            hours: Some(DayHours {
                open: hm(9, 0),
                close: hm(12, 0),
            }),
            duration: H,
            now: 0,
            blocked,
            mode,
        }
    }

    fn day_start() -> Ms {
        local_to_ms(date(2024, 6, 3), hm(0, 0), Tz::UTC)
    }

    // ── slots ─────────────────────────────────────────────

    #[test]
    fn slots_step_by_duration_until_close() {
        let plan = DayPlan::new(snapshot(SlotMode::Exclusive, vec![]));
        let times: Vec<NaiveTime> = plan.slots().map(|s| s.time).collect();
        assert_eq!(times, vec![hm(9, 0), hm(10, 0), hm(11, 0)]);
        assert!(plan.slots().all(|s| s.available));
    }

    #[test]
    fn slots_do_not_cross_close() {
        let mut snap = snapshot(SlotMode::Exclusive, vec![]);
        snap.duration = 45 * M;
        let plan = DayPlan::new(snap);
        let times: Vec<NaiveTime> = plan.slots().map(|s| s.time).collect();
        // 09:00, 09:45, 10:30, 11:15 ends exactly at 12:00
        assert_eq!(times, vec![hm(9, 0), hm(9, 45), hm(10, 30), hm(11, 15)]);
    }

    #[test]
    fn closed_day_has_no_slots() {
        let mut snap = snapshot(SlotMode::Exclusive, vec![]);
        snap.hours = None;
        let plan = DayPlan::new(snap);
        assert_eq!(plan.slots().count(), 0);
        assert!(!plan.has_available_slot());
    }

    #[test]
    fn slot_iteration_restarts() {
        let plan = DayPlan::new(snapshot(SlotMode::Exclusive, vec![]));
        let mut it = plan.slots();
        it.next();
        let rest = it.clone().count();
        assert_eq!(rest, 2);
        assert_eq!(plan.slots().count(), 3);
    }

    #[test]
    fn booking_blocks_overlapping_slots_only() {
        let d = day_start();
        let b = booking(d + 10 * H + 30 * M, d + 11 * H + 30 * M);
        let plan = DayPlan::new(snapshot(SlotMode::Exclusive, vec![b]));
        let avail: Vec<bool> = plan.slots().map(|s| s.available).collect();
        assert_eq!(avail, vec![true, false, false]);
    }

    #[test]
    fn adjacent_booking_does_not_block() {
        let d = day_start();
        let b = booking(d + 8 * H, d + 9 * H);
        let plan = DayPlan::new(snapshot(SlotMode::Exclusive, vec![b]));
        assert!(plan.slots().next().unwrap().available);
    }

    #[test]
    fn past_slots_unavailable() {
        let d = day_start();
        let mut snap = snapshot(SlotMode::Exclusive, vec![]);
        snap.now = d + 10 * H + 1;
        let plan = DayPlan::new(snap);
        let avail: Vec<bool> = plan.slots().map(|s| s.available).collect();
        assert_eq!(avail, vec![false, false, true]);
        assert_eq!(plan.evaluate(&Span::new(d + 9 * H, d + 10 * H)), Verdict::Past);
    }

    #[test]
    fn resources_listed_per_slot() {
        let d = day_start();
        let anna = Ulid::new();
        let ben = Ulid::new();
        let mode = SlotMode::Resources(vec![
            ResourceCalendar {
                id: anna,
                busy: vec![booking(d + 9 * H, d + 10 * H)],
            },
            ResourceCalendar { id: ben, busy: vec![] },
        ]);
        let plan = DayPlan::new(snapshot(mode, vec![]));
        let slots: Vec<Slot> = plan.slots().collect();
        assert_eq!(slots[0].eligible_resources, vec![ben]);
        assert_eq!(slots[1].eligible_resources, vec![anna, ben]);
    }

    #[test]
    fn all_resources_busy_means_unavailable() {
        let d = day_start();
        let b = booking(d + 9 * H, d + 12 * H);
        let mode = SlotMode::Resources(vec![ResourceCalendar {
            id: Ulid::new(),
            busy: vec![b],
        }]);
        let plan = DayPlan::new(snapshot(mode, vec![]));
        assert!(!plan.has_available_slot());
        assert_eq!(
            plan.evaluate(&Span::new(d + 9 * H, d + 10 * H)),
            Verdict::NoResource(Some(b.reservation_id))
        );
    }

    #[test]
    fn no_eligible_resources_means_unavailable() {
        let plan = DayPlan::new(snapshot(SlotMode::Resources(vec![]), vec![]));
        assert!(!plan.has_available_slot());
    }

    #[test]
    fn seat_pool_arithmetic() {
        let d = day_start();
        let slot = Span::new(d + 9 * H, d + 10 * H);
        let loads = vec![
            (booking(slot.start, slot.end), 8),
            (booking(slot.start, slot.end), 6),
            (booking(slot.start, slot.end), 4),
        ];
        let fits = snapshot(
            SlotMode::Seats {
                max_capacity: 20,
                party: 2,
                loads: loads.clone(),
            },
            vec![],
        );
        assert!(evaluate_window(&fits, &slot).is_free());

        let too_many = snapshot(
            SlotMode::Seats {
                max_capacity: 20,
                party: 3,
                loads,
            },
            vec![],
        );
        assert_eq!(evaluate_window(&too_many, &slot), Verdict::Full { remaining: 2 });
    }

    #[test]
    fn candidate_alignment() {
        let d = day_start();
        let plan = DayPlan::new(snapshot(SlotMode::Exclusive, vec![]));
        assert!(plan.is_candidate(&Span::new(d + 10 * H, d + 11 * H)));
        assert!(!plan.is_candidate(&Span::new(d + 10 * H + 15 * M, d + 11 * H + 15 * M)));
        assert!(!plan.is_candidate(&Span::new(d + 12 * H, d + 13 * H)));
        assert!(!plan.is_candidate(&Span::new(d + 10 * H, d + 10 * H + 30 * M)));
    }

    // ── peak_load ─────────────────────────────────────────

    #[test]
    fn peak_load_counts_concurrency_not_sum() {
        let loads = vec![(booking(0, 100), 5), (booking(100, 200), 7), (booking(50, 150), 2)];
        assert_eq!(peak_load(&loads, &Span::new(0, 200)), 9);
        assert_eq!(peak_load(&loads, &Span::new(0, 50)), 5);
    }

    #[test]
    fn peak_load_ignores_outside_window() {
        let loads = vec![(booking(0, 100), 5)];
        assert_eq!(peak_load(&loads, &Span::new(100, 200)), 0);
        assert_eq!(peak_load(&[], &Span::new(0, 1)), 0);
    }

    // ── night ranges ──────────────────────────────────────

    fn rental() -> Service {
        Service::new(Ulid::new(), ServiceKind::NightRange)
    }

    fn stay(a: NaiveDate, b: NaiveDate) -> Stay {
        Stay {
            check_in: a,
            check_out: b,
        }
    }

    #[test]
    fn calendar_classification() {
        let existing = Ulid::new();
        let s = stay(date(2024, 6, 1), date(2024, 6, 5));
        let cal = NightCalendar::from_stays([(existing, &s)]);
        assert_eq!(cal.day(date(2024, 5, 31)), NightDay::Free);
        assert_eq!(cal.day(date(2024, 6, 1)), NightDay::CheckInBlocked);
        assert_eq!(cal.day(date(2024, 6, 2)), NightDay::FullyBooked);
        assert_eq!(cal.day(date(2024, 6, 4)), NightDay::FullyBooked);
        assert_eq!(cal.day(date(2024, 6, 5)), NightDay::CheckOutBlocked);
    }

    #[test]
    fn turnover_day_counts_as_fully_booked() {
        let a = stay(date(2024, 6, 1), date(2024, 6, 5));
        let b = stay(date(2024, 6, 5), date(2024, 6, 8));
        let cal = NightCalendar::from_stays([(Ulid::new(), &a), (Ulid::new(), &b)]);
        assert_eq!(cal.day(date(2024, 6, 5)), NightDay::Turnover);
        assert!(cal.is_fully_booked(date(2024, 6, 5)));
    }

    #[test]
    fn check_in_on_previous_check_out_is_allowed() {
        let s = stay(date(2024, 6, 1), date(2024, 6, 5));
        let cal = NightCalendar::from_stays([(Ulid::new(), &s)]);
        assert_eq!(cal.check_range(&rental(), date(2024, 6, 5), date(2024, 6, 8)), Ok(()));
        assert_eq!(cal.check_range(&rental(), date(2024, 5, 28), date(2024, 6, 1)), Ok(()));
    }

    #[test]
    fn overlapping_stays_rejected() {
        let existing = Ulid::new();
        let s = stay(date(2024, 6, 1), date(2024, 6, 5));
        let cal = NightCalendar::from_stays([(existing, &s)]);
        assert_eq!(
            cal.check_range(&rental(), date(2024, 6, 4), date(2024, 6, 6)),
            Err(NightRejection::Taken(existing))
        );
        // same check-in date: the afternoon is already taken
        assert_eq!(
            cal.check_range(&rental(), date(2024, 6, 1), date(2024, 6, 2)),
            Err(NightRejection::Taken(existing))
        );
        // same check-out date: the morning is already taken
        assert_eq!(
            cal.check_range(&rental(), date(2024, 6, 3), date(2024, 6, 5)),
            Err(NightRejection::Taken(existing))
        );
    }

    #[test]
    fn enclosing_stay_rejected() {
        let existing = Ulid::new();
        let s = stay(date(2024, 6, 3), date(2024, 6, 4));
        let cal = NightCalendar::from_stays([(existing, &s)]);
        assert_eq!(
            cal.check_range(&rental(), date(2024, 6, 1), date(2024, 6, 6)),
            Err(NightRejection::Taken(existing))
        );
    }

    #[test]
    fn same_day_check_in_rejected_only_when_afternoon_taken() {
        let first = stay(date(2024, 6, 1), date(2024, 6, 5));
        let cal = NightCalendar::from_stays([(Ulid::new(), &first)]);
        assert!(cal.check_range(&rental(), date(2024, 6, 5), date(2024, 6, 6)).is_ok());

        let second = stay(date(2024, 6, 5), date(2024, 6, 7));
        let blocker = Ulid::new();
        let cal = NightCalendar::from_stays([(Ulid::new(), &first), (blocker, &second)]);
        assert_eq!(
            cal.check_range(&rental(), date(2024, 6, 5), date(2024, 6, 6)),
            Err(NightRejection::Taken(blocker))
        );
    }

    #[test]
    fn minimum_nights_enforced() {
        let mut svc = rental();
        svc.stay_rule = StayRule::MinimumNights(3);
        let cal = NightCalendar::default();
        assert!(matches!(
            cal.check_range(&svc, date(2024, 6, 1), date(2024, 6, 3)),
            Err(NightRejection::MinimumNotMet(_))
        ));
        assert_eq!(cal.check_range(&svc, date(2024, 6, 1), date(2024, 6, 4)), Ok(()));
    }

    #[test]
    fn minimum_order_value_enforced() {
        let mut svc = rental();
        svc.price_per_night = 8_000;
        svc.stay_rule = StayRule::MinimumOrderValue(20_000);
        let cal = NightCalendar::default();
        assert!(matches!(
            cal.check_range(&svc, date(2024, 6, 1), date(2024, 6, 3)),
            Err(NightRejection::MinimumNotMet(_))
        ));
        assert_eq!(cal.check_range(&svc, date(2024, 6, 1), date(2024, 6, 4)), Ok(()));
    }

    #[test]
    fn empty_or_reversed_range_invalid() {
        let cal = NightCalendar::default();
        assert!(matches!(
            cal.check_range(&rental(), date(2024, 6, 2), date(2024, 6, 2)),
            Err(NightRejection::Invalid(_))
        ));
        assert!(matches!(
            cal.check_range(&rental(), date(2024, 6, 3), date(2024, 6, 2)),
            Err(NightRejection::Invalid(_))
        ));
    }

    #[test]
    fn stay_span_uses_clock_times() {
        let svc = rental();
        let s = stay(date(2024, 6, 1), date(2024, 6, 5));
        let span = stay_span(&svc, &s, Tz::UTC);
        assert_eq!(span.start, local_to_ms(date(2024, 6, 1), hm(14, 0), Tz::UTC));
        assert_eq!(span.end, local_to_ms(date(2024, 6, 5), hm(10, 0), Tz::UTC));

        // back-to-back stays touch but do not overlap
        let next = stay_span(&svc, &stay(date(2024, 6, 5), date(2024, 6, 6)), Tz::UTC);
        assert!(!span.overlaps(&next));
    }
}
