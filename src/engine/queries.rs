use std::collections::BTreeSet;

use chrono::NaiveDate;
use tokio::sync::OwnedRwLockReadGuard;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time::month_days;

use super::availability::{DayPlan, NightDay};
use super::conflict::{day_snapshot, night_calendar, LedgerView};
use super::store::ProfileState;
use super::{Engine, EngineError};

/// Read guards for one service and everything its availability depends on.
struct ReadView {
    profile: ProfileState,
    target: OwnedRwLockReadGuard<ServiceState>,
    others: Vec<OwnedRwLockReadGuard<ServiceState>>,
    /// Eligibility order.
    resources: Vec<OwnedRwLockReadGuard<ResourceState>>,
}

impl Engine {
    /// Shared locks in the same global order admission uses.
    async fn read_view(&self, service_id: Ulid) -> Result<ReadView, EngineError> {
        let profile = *self.profile.read().await;
        let target = self.service(&service_id)?;

        let mut target_guard = None;
        let mut others = Vec::new();
        if profile.settings.exclusive {
            for id in self.store.service_ids() {
                if id == service_id {
                    target_guard = Some(target.clone().read_owned().await);
                } else if let Some(ss) = self.store.get_service(&id) {
                    others.push(ss.read_owned().await);
                }
            }
        }
        let target = match target_guard {
            Some(g) => g,
            None => target.read_owned().await,
        };

        let mut sorted = target.eligible.clone();
        sorted.sort();
        let mut locked = Vec::with_capacity(sorted.len());
        for rid in sorted {
            if let Some(rs) = self.store.get_resource(&rid) {
                locked.push(rs.read_owned().await);
            }
        }
        let mut resources = Vec::with_capacity(locked.len());
        for rid in &target.eligible {
            if let Some(pos) = locked.iter().position(|g| g.resource.id == *rid) {
                resources.push(locked.swap_remove(pos));
            }
        }

        Ok(ReadView {
            profile,
            target,
            others,
            resources,
        })
    }

    /// Slot plan of one day. Iterate it with [`DayPlan::slots`].
    pub async fn get_slots(
        &self,
        service_id: Ulid,
        date: NaiveDate,
        party_size: Option<u32>,
    ) -> Result<DayPlan, EngineError> {
        let party = query_party(party_size)?;
        let rv = self.read_view(service_id).await?;
        if rv.target.service.kind == ServiceKind::NightRange {
            return Err(EngineError::InvalidRequest(
                "night-range services are booked by date range, not by slot".into(),
            ));
        }
        let others: Vec<&ServiceState> = rv.others.iter().map(|g| &**g).collect();
        let resources: Vec<&ResourceState> = rv.resources.iter().map(|g| &**g).collect();
        let view = LedgerView {
            profile: &rv.profile,
            service: &rv.target,
            others: &others,
            resources: &resources,
            party,
            now: self.now(),
        };
        Ok(DayPlan::new(day_snapshot(&view, date)))
    }

    /// Days of the month containing `month` with nothing left to book. Closed
    /// days count as fully booked. For night-range services these are the dates
    /// no stay can touch.
    pub async fn get_fully_booked_dates(
        &self,
        service_id: Ulid,
        month: NaiveDate,
        party_size: Option<u32>,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let party = query_party(party_size)?;
        let rv = self.read_view(service_id).await?;

        if rv.target.service.kind == ServiceKind::NightRange {
            let cal = night_calendar(&rv.target);
            return Ok(month_days(month).filter(|d| cal.is_fully_booked(*d)).collect());
        }

        let others: Vec<&ServiceState> = rv.others.iter().map(|g| &**g).collect();
        let resources: Vec<&ResourceState> = rv.resources.iter().map(|g| &**g).collect();
        let view = LedgerView {
            profile: &rv.profile,
            service: &rv.target,
            others: &others,
            resources: &resources,
            party,
            now: self.now(),
        };
        Ok(month_days(month)
            .filter(|d| !DayPlan::new(day_snapshot(&view, *d)).has_available_slot())
            .collect())
    }

    /// Live (non-cancelled) reservations of a service, by start.
    pub async fn get_booked_ranges(&self, service_id: Ulid) -> Result<Vec<BookedRange>, EngineError> {
        let ss = self.service(&service_id)?;
        let guard = ss.read().await;
        Ok(guard
            .reservations
            .iter()
            .filter(|r| r.occupies())
            .map(|r| BookedRange {
                reservation_id: r.id,
                start: r.span.start,
                end: r.span.end,
                check_in: r.stay.map(|s| s.check_in),
                check_out: r.stay.map(|s| s.check_out),
                status: r.status,
            })
            .collect())
    }

    /// Every occupied date of a night-range service with its split-day marker.
    pub async fn get_night_calendar(&self, service_id: Ulid) -> Result<Vec<(NaiveDate, NightDay)>, EngineError> {
        let ss = self.service(&service_id)?;
        let guard = ss.read().await;
        if guard.service.kind != ServiceKind::NightRange {
            return Err(EngineError::InvalidRequest(format!(
                "{} services have no night calendar",
                guard.service.kind
            )));
        }
        let cal = night_calendar(&guard);
        let dates: BTreeSet<NaiveDate> = cal
            .fully_booked
            .keys()
            .chain(cal.check_in_blocked.keys())
            .chain(cal.check_out_blocked.keys())
            .copied()
            .collect();
        Ok(dates.into_iter().map(|d| (d, cal.day(d))).collect())
    }

    /// All reservations of a service, any status, by start.
    pub async fn list_reservations(&self, service_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let ss = self.service(&service_id)?;
        let guard = ss.read().await;
        Ok(guard.reservations.clone())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let ss = self.service_of(&id)?;
        let guard = ss.read().await;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_services(&self) -> Vec<Service> {
        let mut out = Vec::new();
        for id in self.store.service_ids() {
            if let Some(ss) = self.store.get_service(&id) {
                out.push(ss.read().await.service.clone());
            }
        }
        out
    }

    /// All resources, or the eligible set of one service in assignment order.
    pub async fn list_resources(&self, service_id: Option<Ulid>) -> Result<Vec<Resource>, EngineError> {
        let ids = match service_id {
            Some(sid) => self.service(&sid)?.read().await.eligible.clone(),
            None => self.store.resource_ids(),
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rs) = self.store.get_resource(&id) {
                out.push(rs.read().await.resource.clone());
            }
        }
        Ok(out)
    }

    pub async fn profile_state(&self) -> ProfileState {
        *self.profile.read().await
    }
}

fn query_party(party: Option<u32>) -> Result<u32, EngineError> {
    match party {
        None => Ok(1),
        Some(0) => Err(EngineError::InvalidRequest("party size must be positive".into())),
        Some(p) if p > MAX_PARTY_SIZE => Err(EngineError::LimitExceeded("party too large")),
        Some(p) => Ok(p),
    }
}
