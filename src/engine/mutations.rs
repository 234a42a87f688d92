use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{validate_hours, validate_resource, validate_service};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Waits for in-flight admissions, which hold the profile lock shared.
    pub async fn set_profile_settings(&self, settings: ProfileSettings) -> Result<(), EngineError> {
        let mut profile = self.profile.write().await;
        let event = Event::ProfileUpdated { settings };
        self.wal_append(&event).await?;
        profile.apply_event(&event);
        self.notify.send(&event);
        info!(
            "profile settings: tz={} exclusive={} auto_confirm={}",
            settings.timezone, settings.exclusive, settings.auto_confirm
        );
        Ok(())
    }

    /// Replace one weekday's hours (Monday = 0). `None` closes the day.
    pub async fn set_working_hours(&self, weekday: u8, hours: Option<DayHours>) -> Result<(), EngineError> {
        if weekday > 6 {
            return Err(EngineError::InvalidConfig(format!("weekday {weekday} out of range 0..=6")));
        }
        validate_hours(&hours)?;
        let mut profile = self.profile.write().await;
        let event = Event::WorkingHoursSet { weekday, hours };
        self.wal_append(&event).await?;
        profile.apply_event(&event);
        self.notify.send(&event);
        Ok(())
    }

    /// Create the service, or update it in place. Returns `true` if it was created.
    /// The kind of an existing service never changes.
    pub async fn upsert_service(&self, mut service: Service) -> Result<bool, EngineError> {
        if service.require_resource_selection {
            service.allow_resource_selection = true;
        }
        if service.kind == ServiceKind::NightRange {
            service.duration_minutes = 0;
        }
        validate_service(&service)?;
        let _quiesce = self.profile.read().await;

        if let Some(ss) = self.store.get_service(&service.id) {
            let mut guard = ss.write().await;
            if guard.service.kind != service.kind {
                return Err(EngineError::InvalidConfig(format!(
                    "service kind is immutable ({} -> {})",
                    guard.service.kind, service.kind
                )));
            }
            let event = Event::ServiceUpdated { service };
            self.persist_and_apply(&mut guard, &event).await?;
            return Ok(false);
        }

        if self.store.service_count() >= MAX_SERVICES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        let event = Event::ServiceCreated {
            service: service.clone(),
        };
        self.wal_append(&event).await?;
        info!("created {} service {}", service.kind, service.id);
        self.store.insert_service(service);
        self.notify.send(&event);
        Ok(true)
    }

    /// Create the resource, or update it in place. Returns `true` if it was created.
    /// Deactivating keeps existing bookings; it only stops new ones.
    pub async fn upsert_resource(&self, mut resource: Resource) -> Result<bool, EngineError> {
        if resource.kind == ResourceKind::Worker {
            resource.capacity = 1;
        }
        validate_resource(&resource)?;
        let _quiesce = self.profile.read().await;

        if let Some(rs) = self.store.get_resource(&resource.id) {
            let mut guard = rs.write().await;
            if guard.resource.kind != resource.kind {
                return Err(EngineError::InvalidConfig(format!(
                    "resource kind is immutable ({} -> {})",
                    guard.resource.kind, resource.kind
                )));
            }
            let event = Event::ResourceUpdated { resource };
            self.wal_append(&event).await?;
            self.store.apply_to_resource(&mut guard, &event);
            self.notify.send(&event);
            return Ok(false);
        }

        if self.store.resource_count() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        let event = Event::ResourceCreated {
            resource: resource.clone(),
        };
        self.wal_append(&event).await?;
        self.store.insert_resource(resource);
        self.notify.send(&event);
        Ok(true)
    }

    /// Add a resource to a service's eligible set. Assigning twice is a no-op.
    pub async fn assign_resource(&self, service_id: Ulid, resource_id: Ulid) -> Result<(), EngineError> {
        let _quiesce = self.profile.read().await;
        let ss = self.service(&service_id)?;
        let resource_kind = {
            let rs = self.resource(&resource_id)?;
            rs.read().await.resource.kind
        };
        let mut guard = ss.write().await;
        if guard.service.kind.resource_kind() != Some(resource_kind) {
            return Err(EngineError::InvalidConfig(format!(
                "a {resource_kind} cannot serve a {} service",
                guard.service.kind
            )));
        }
        if guard.eligible.contains(&resource_id) {
            return Ok(());
        }
        let event = Event::ResourceAssigned {
            service_id,
            resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Remove a resource from a service's eligible set. Its existing bookings stay.
    pub async fn unassign_resource(&self, service_id: Ulid, resource_id: Ulid) -> Result<(), EngineError> {
        let _quiesce = self.profile.read().await;
        let ss = self.service(&service_id)?;
        let mut guard = ss.write().await;
        if !guard.eligible.contains(&resource_id) {
            return Err(EngineError::NotFound(resource_id));
        }
        let event = Event::ResourceUnassigned {
            service_id,
            resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state. Reservations are written with their current status.
    ///
    /// Every ledger mutation holds the profile lock shared, so holding it
    /// exclusively here keeps appends out until the swapped file is in place.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let profile = self.profile.write().await;
        let mut events = vec![Event::ProfileUpdated {
            settings: profile.settings,
        }];
        for (weekday, hours) in profile.hours.days.iter().enumerate() {
            if hours.is_some() {
                events.push(Event::WorkingHoursSet {
                    weekday: weekday as u8,
                    hours: *hours,
                });
            }
        }

        for id in self.store.resource_ids() {
            if let Some(rs) = self.store.get_resource(&id) {
                let guard = rs.read().await;
                events.push(Event::ResourceCreated {
                    resource: guard.resource.clone(),
                });
            }
        }

        for id in self.store.service_ids() {
            let Some(ss) = self.store.get_service(&id) else {
                continue;
            };
            let guard = ss.read().await;
            events.push(Event::ServiceCreated {
                service: guard.service.clone(),
            });
            for resource_id in &guard.eligible {
                events.push(Event::ResourceAssigned {
                    service_id: id,
                    resource_id: *resource_id,
                });
            }
            for reservation in &guard.reservations {
                events.push(Event::ReservationAdmitted {
                    reservation: reservation.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(profile);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
