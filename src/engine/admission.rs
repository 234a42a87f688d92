use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time::{local_date, local_to_ms};

use super::availability::{stay_span, DayPlan, NightRejection, Verdict};
use super::conflict::{
    admit_verdict, cross_service_blocks, day_snapshot, night_calendar, oversized_party, resource_fit, validate_contact,
    validate_span, LedgerView,
};
use super::store::{InMemoryStore, ProfileState};
use super::{Engine, EngineError};

/// The window a customer asks for, in the profile's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedWindow {
    Slot { date: NaiveDate, time: NaiveTime },
    Nights { check_in: NaiveDate, check_out: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub id: Ulid,
    pub service_id: Ulid,
    pub window: RequestedWindow,
    pub resource_id: Option<Ulid>,
    pub party_size: Option<u32>,
    pub customer: Customer,
    pub notes: Option<String>,
}

struct ServiceLocks {
    target: OwnedRwLockWriteGuard<ServiceState>,
    others: Vec<OwnedRwLockReadGuard<ServiceState>>,
}

type ResourceLocks = HashMap<Ulid, OwnedRwLockWriteGuard<ResourceState>>;

/// What a checked request resolved to, before anything is written.
struct Admitted {
    span: Span,
    stay: Option<Stay>,
    party_size: Option<u32>,
    resource_id: Option<Ulid>,
}

/// A reservation id held by one admission until it commits or gives up.
struct IdClaim<'a> {
    store: &'a InMemoryStore,
    id: Ulid,
    committed: bool,
}

impl<'a> IdClaim<'a> {
    fn take(store: &'a InMemoryStore, id: Ulid, service_id: Ulid) -> Result<Self, EngineError> {
        if !store.claim_reservation_id(id, service_id) {
            return Err(EngineError::AlreadyExists(id));
        }
        Ok(Self {
            store,
            id,
            committed: false,
        })
    }
}

impl Drop for IdClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.release_reservation_id(&self.id);
        }
    }
}

impl Engine {
    /// Admit a reservation, or reject it without touching the ledger.
    pub async fn create_reservation(&self, req: ReservationRequest) -> Result<Reservation, EngineError> {
        let result = self.admit(req).await;
        let outcome = match &result {
            Ok(_) => "admitted",
            Err(e) => e.kind(),
        };
        metrics::counter!(crate::observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn admit(&self, req: ReservationRequest) -> Result<Reservation, EngineError> {
        validate_contact(&req.customer, &req.notes)?;
        // Every early return below drops the claim and frees the id again.
        let mut claim = IdClaim::take(&self.store, req.id, req.service_id)?;

        // Held shared until commit: the exclusivity toggle can't flip mid-admission.
        let profile = self.profile.read().await;
        let mut services = self
            .lock_services(req.service_id, profile.settings.exclusive)
            .await?;
        if services.target.reservations.len() >= MAX_RESERVATIONS_PER_SERVICE {
            return Err(EngineError::LimitExceeded("too many reservations on service"));
        }

        let service = services.target.service.clone();
        let mut resources = ResourceLocks::new();
        let admitted = match (service.kind, req.window) {
            (ServiceKind::NightRange, RequestedWindow::Nights { check_in, check_out }) => {
                if let Some(rid) = req.resource_id {
                    return Err(EngineError::ResourceUnavailable(rid, "resource selection not allowed"));
                }
                self.check_nights(&profile, &services, check_in, check_out)?
            }
            (ServiceKind::TimeSlot | ServiceKind::Table, RequestedWindow::Slot { date, time }) => {
                let party = match service.kind {
                    ServiceKind::Table => Some(check_party(req.party_size)?),
                    _ => None,
                };
                if service.require_resource_selection && req.resource_id.is_none() {
                    return Err(EngineError::MissingResource);
                }
                if service.requires_resource {
                    resources = self.lock_candidates(&services.target, req.resource_id, party).await?;
                } else if let Some(rid) = req.resource_id {
                    return Err(EngineError::ResourceUnavailable(rid, "resource selection not allowed"));
                }
                self.check_slot(&profile, &services, &resources, date, time, party, req.resource_id)?
            }
            _ => {
                return Err(EngineError::InvalidRequest(format!(
                    "window shape does not match a {} service",
                    service.kind
                )));
            }
        };

        let status = if profile.settings.auto_confirm {
            ReservationStatus::Confirmed
        } else {
            ReservationStatus::Pending
        };
        let reservation = Reservation {
            id: req.id,
            service_id: service.id,
            resource_id: admitted.resource_id,
            span: admitted.span,
            stay: admitted.stay,
            party_size: admitted.party_size,
            status,
            customer: req.customer,
            notes: req.notes,
            created_at: self.now(),
        };

        let event = Event::ReservationAdmitted {
            reservation: reservation.clone(),
        };
        self.wal_append(&event).await?;
        self.store.apply_to_service(&mut services.target, &event);
        if let Some(rid) = reservation.resource_id
            && let Some(guard) = resources.get_mut(&rid) {
                self.store.apply_to_resource(guard, &event);
            }
        self.notify.send(&event);
        claim.committed = true;

        info!(
            "admitted reservation {} on service {} ({})",
            reservation.id, reservation.service_id, reservation.status
        );
        Ok(reservation)
    }

    /// Write-lock the target service. Under profile exclusivity every other
    /// service is read-locked too, all in id order.
    async fn lock_services(&self, target_id: Ulid, exclusive: bool) -> Result<ServiceLocks, EngineError> {
        let target = self.service(&target_id)?;
        if !exclusive {
            return Ok(ServiceLocks {
                target: target.write_owned().await,
                others: Vec::new(),
            });
        }
        let mut target_guard = None;
        let mut others = Vec::new();
        for id in self.store.service_ids() {
            if id == target_id {
                target_guard = Some(target.clone().write_owned().await);
            } else if let Some(ss) = self.store.get_service(&id) {
                others.push(ss.read_owned().await);
            }
        }
        Ok(ServiceLocks {
            target: target_guard.ok_or(EngineError::NotFound(target_id))?,
            others,
        })
    }

    /// Write-lock the resources the request may bind: the supplied one after
    /// checking it, or every eligible one for first-fit.
    async fn lock_candidates(
        &self,
        ss: &ServiceState,
        supplied: Option<Ulid>,
        party: Option<u32>,
    ) -> Result<ResourceLocks, EngineError> {
        let service = &ss.service;
        let mut ids = match supplied {
            Some(rid) => {
                if !service.allow_resource_selection {
                    return Err(EngineError::ResourceUnavailable(rid, "resource selection not allowed"));
                }
                if !ss.eligible.contains(&rid) {
                    return Err(EngineError::ResourceUnavailable(rid, "not assigned to this service"));
                }
                vec![rid]
            }
            None => ss.eligible.clone(),
        };
        ids.sort();
        ids.dedup();

        let mut locks = ResourceLocks::with_capacity(ids.len());
        for rid in ids {
            let guard = self.resource(&rid)?.write_owned().await;
            locks.insert(rid, guard);
        }
        if let Some(rid) = supplied
            && let Some(guard) = locks.get(&rid) {
                resource_fit(service, guard, party.unwrap_or(1))
                    .map_err(|reason| EngineError::ResourceUnavailable(rid, reason))?;
            }
        Ok(locks)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_slot(
        &self,
        profile: &ProfileState,
        services: &ServiceLocks,
        resources: &ResourceLocks,
        date: NaiveDate,
        time: NaiveTime,
        party: Option<u32>,
        supplied: Option<Ulid>,
    ) -> Result<Admitted, EngineError> {
        let ss = &*services.target;
        let others: Vec<&ServiceState> = services.others.iter().map(|g| &**g).collect();
        // Eligibility order decides first fit.
        let candidates: Vec<&ResourceState> = ss
            .eligible
            .iter()
            .filter_map(|rid| resources.get(rid).map(|g| &**g))
            .collect();

        let view = LedgerView {
            profile,
            service: ss,
            others: &others,
            resources: &candidates,
            party: party.unwrap_or(1),
            now: self.now(),
        };
        let start = local_to_ms(date, time, profile.settings.timezone);
        let span = Span::new(start, start + ss.service.duration_ms());
        validate_span(&span)?;

        let plan = DayPlan::new(day_snapshot(&view, date));
        if !plan.is_candidate(&span) {
            return Err(EngineError::InvalidRequest(format!(
                "{} on {date} is not a bookable slot start",
                time.format("%H:%M")
            )));
        }
        let verdict = plan.evaluate(&span);
        if matches!(verdict, Verdict::NoResource(None))
            && supplied.is_none()
            && let Some(largest) = oversized_party(&ss.service, &candidates, view.party)
        {
            return Err(EngineError::CapacityExceeded {
                remaining: largest,
                requested: view.party,
            });
        }
        let free = admit_verdict(verdict, view.party, supplied)?;
        let resource_id = if ss.service.requires_resource {
            free.first().copied()
        } else {
            None
        };
        Ok(Admitted {
            span,
            stay: None,
            party_size: party,
            resource_id,
        })
    }

    fn check_nights(
        &self,
        profile: &ProfileState,
        services: &ServiceLocks,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Admitted, EngineError> {
        let ss = &*services.target;
        let tz = profile.settings.timezone;
        if (check_out - check_in).num_days() > MAX_STAY_NIGHTS {
            return Err(EngineError::LimitExceeded("stay too long"));
        }
        if check_in < local_date(self.now(), tz) {
            return Err(EngineError::InPast);
        }

        night_calendar(ss)
            .check_range(&ss.service, check_in, check_out)
            .map_err(|rejection| match rejection {
                NightRejection::Invalid(msg) => EngineError::InvalidRequest(msg.to_string()),
                NightRejection::Taken(id) => EngineError::SlotTaken(id),
                NightRejection::MinimumNotMet(msg) => EngineError::MinimumNotMet(msg),
            })?;

        let stay = Stay { check_in, check_out };
        let span = stay_span(&ss.service, &stay, tz);
        validate_span(&span)?;

        let others: Vec<&ServiceState> = services.others.iter().map(|g| &**g).collect();
        let view = LedgerView {
            profile,
            service: ss,
            others: &others,
            resources: &[],
            party: 1,
            now: self.now(),
        };
        if let Some(b) = cross_service_blocks(&view, &span).first() {
            return Err(EngineError::SlotTaken(b.reservation_id));
        }
        Ok(Admitted {
            span,
            stay: Some(stay),
            party_size: None,
            resource_id: None,
        })
    }
}

fn check_party(party: Option<u32>) -> Result<u32, EngineError> {
    match party {
        None | Some(0) => Err(EngineError::InvalidRequest("table reservations need a party size".into())),
        Some(p) if p > MAX_PARTY_SIZE => Err(EngineError::LimitExceeded("party too large")),
        Some(p) => Ok(p),
    }
}
