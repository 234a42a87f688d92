use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Move a reservation along the lifecycle. Cancelling frees its window on
    /// the bound resource immediately.
    pub async fn update_reservation_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let _quiesce = self.profile.read().await;
        let ss = self.service_of(&id)?;
        let mut guard = ss.write().await;
        let current = guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        if !current.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        self.change_status(&mut guard, &current, status).await?;
        info!("reservation {id}: {} -> {status}", current.status);
        Ok(Reservation { status, ..current })
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.update_reservation_status(id, ReservationStatus::Cancelled).await
    }

    /// Conditional CONFIRMED → COMPLETED once the reservation has ended.
    /// Returns whether it changed anything; repeated or concurrent calls are no-ops.
    pub async fn complete_if_due(&self, id: Ulid, now: Ms) -> Result<bool, EngineError> {
        let _quiesce = self.profile.read().await;
        let ss = self.service_of(&id)?;
        let mut guard = ss.write().await;
        let Some(current) = guard.reservations.iter().find(|r| r.id == id).cloned() else {
            return Ok(false);
        };
        if current.status != ReservationStatus::Confirmed || current.span.end > now {
            return Ok(false);
        }
        self.change_status(&mut guard, &current, ReservationStatus::Completed)
            .await?;
        Ok(true)
    }

    /// CONFIRMED reservations whose end has passed. Busy services are skipped
    /// and picked up by the next sweep.
    pub fn collect_due_completions(&self, now: Ms) -> Vec<Ulid> {
        let mut due = Vec::new();
        for service_id in self.store.service_ids() {
            let Some(ss) = self.store.get_service(&service_id) else {
                continue;
            };
            if let Ok(guard) = ss.try_read() {
                due.extend(
                    guard
                        .reservations
                        .iter()
                        .filter(|r| r.status == ReservationStatus::Confirmed && r.span.end <= now)
                        .map(|r| r.id),
                );
            }
        }
        due
    }

    async fn change_status(
        &self,
        ss: &mut ServiceState,
        current: &Reservation,
        status: ReservationStatus,
    ) -> Result<(), EngineError> {
        let event = Event::ReservationStatusChanged {
            id: current.id,
            service_id: current.service_id,
            status,
        };
        // Service lock first, then the resource: same order as admission.
        let resource = match current.resource_id {
            Some(rid) if status == ReservationStatus::Cancelled => Some(self.resource(&rid)?),
            _ => None,
        };
        let mut resource_guard = match &resource {
            Some(rs) => Some(rs.write().await),
            None => None,
        };
        self.wal_append(&event).await?;
        self.store.apply_to_service(ss, &event);
        if let Some(guard) = resource_guard.as_mut() {
            self.store.apply_to_resource(guard, &event);
        }
        self.notify.send(&event);
        Ok(())
    }
}
