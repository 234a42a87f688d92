//! Wall-clock ↔ instant conversion in the profile's time zone, and the clock
//! the engine reads "now" from.
//!
//! Everything past this module works in [`Ms`]; local dates and clock times only
//! exist at the edges (working hours, night-range dates, SQL input/output).

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::model::Ms;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for simulations and tests.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: Ms) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: Ms) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Ms) {
        self.0.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> Ms {
        self.0.load(Ordering::SeqCst)
    }
}

/// Local date + clock time → Unix millis.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
/// Non-existent ones (DST spring-forward gap) move forward by the gap.
pub fn local_to_ms(date: NaiveDate, time: NaiveTime, tz: Tz) -> Ms {
    let naive = date.and_time(time);
    resolve_local(naive, tz)
}

fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Ms {
    if let Some(dt) = naive.and_local_timezone(tz).earliest() {
        return dt.timestamp_millis();
    }
    let shifted = naive + Duration::hours(1);
    shifted
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

pub fn ms_to_local(ms: Ms, tz: Tz) -> DateTime<Tz> {
    let utc = DateTime::from_timestamp_millis(ms).unwrap_or_default();
    tz.from_utc_datetime(&utc.naive_utc())
}

pub fn local_date(ms: Ms, tz: Tz) -> NaiveDate {
    ms_to_local(ms, tz).date_naive()
}

/// RFC 3339 with the zone's offset, e.g. `2024-06-01T14:00:00+02:00`.
pub fn format_instant(ms: Ms, tz: Tz) -> String {
    ms_to_local(ms, tz).to_rfc3339()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// `YYYY-MM` → first day of that month.
pub fn parse_month(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d").ok()
}

/// Every date of the month containing `first`.
pub fn month_days(first: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let month = first.month();
    let start = first.with_day(1).unwrap_or(first);
    start.iter_days().take_while(move |d| d.month() == month)
}

pub fn parse_timezone(s: &str) -> Option<Tz> {
    s.trim().parse::<Tz>().ok()
}

/// Monday = 0.
pub fn parse_weekday(s: &str) -> Option<u8> {
    let day = match s.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" | "0" => 0,
        "tue" | "tuesday" | "1" => 1,
        "wed" | "wednesday" | "2" => 2,
        "thu" | "thursday" | "3" => 3,
        "fri" | "friday" | "4" => 4,
        "sat" | "saturday" | "5" => 5,
        "sun" | "sunday" | "6" => 6,
        _ => return None,
    };
    Some(day)
}
