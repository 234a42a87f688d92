use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedServiceState = Arc<RwLock<ServiceState>>;
pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// Profile-wide configuration. Lives behind its own lock in the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileState {
    pub settings: ProfileSettings,
    pub hours: WorkingHours,
}

impl ProfileState {
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::ProfileUpdated { settings } => self.settings = *settings,
            Event::WorkingHoursSet { weekday, hours } => {
                if let Some(slot) = self.hours.days.get_mut(*weekday as usize) {
                    *slot = *hours;
                }
            }
            _ => {}
        }
    }
}

/// Services, resources and the reservation → service index.
pub struct InMemoryStore {
    services: DashMap<Ulid, SharedServiceState>,
    resources: DashMap<Ulid, SharedResourceState>,
    reservation_to_service: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            resources: DashMap::new(),
            reservation_to_service: DashMap::new(),
        }
    }

    // ── Services ─────────────────────────────────────────────

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn contains_service(&self, id: &Ulid) -> bool {
        self.services.contains_key(id)
    }

    pub fn get_service(&self, id: &Ulid) -> Option<SharedServiceState> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn insert_service(&self, service: Service) {
        self.services
            .insert(service.id, Arc::new(RwLock::new(ServiceState::new(service))));
    }

    /// Sorted, which is also the lock order.
    pub fn service_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.services.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &Ulid) -> bool {
        self.resources.contains_key(id)
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.resources
            .insert(resource.id, Arc::new(RwLock::new(ResourceState::new(resource))));
    }

    /// Sorted, which is also the lock order.
    pub fn resource_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Reservation index ────────────────────────────────────

    pub fn service_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_service.get(reservation_id).map(|e| *e.value())
    }

    /// Take `reservation_id` for an admission in flight. False if the id is
    /// already admitted or claimed by another request.
    pub fn claim_reservation_id(&self, reservation_id: Ulid, service_id: Ulid) -> bool {
        match self.reservation_to_service.entry(reservation_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(service_id);
                true
            }
        }
    }

    pub fn release_reservation_id(&self, reservation_id: &Ulid) {
        self.reservation_to_service.remove(reservation_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a service-scoped event. The caller holds the write lock.
    pub fn apply_to_service(&self, ss: &mut ServiceState, event: &Event) {
        match event {
            Event::ServiceUpdated { service } => ss.service = service.clone(),
            Event::ResourceAssigned { resource_id, .. } => {
                if !ss.eligible.contains(resource_id) {
                    ss.eligible.push(*resource_id);
                }
            }
            Event::ResourceUnassigned { resource_id, .. } => {
                ss.eligible.retain(|r| r != resource_id);
            }
            Event::ReservationAdmitted { reservation } => {
                self.reservation_to_service
                    .insert(reservation.id, reservation.service_id);
                ss.insert_reservation(reservation.clone());
            }
            Event::ReservationStatusChanged { id, status, .. } => {
                if let Some(r) = ss.reservation_mut(*id) {
                    r.status = *status;
                }
            }
            _ => {}
        }
    }

    /// Apply an event to one resource calendar. The caller holds the write lock.
    pub fn apply_to_resource(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::ResourceUpdated { resource } => rs.resource = resource.clone(),
            Event::ReservationAdmitted { reservation }
                if reservation.occupies() && reservation.resource_id == Some(rs.resource.id) =>
            {
                rs.insert_booking(Booking {
                    reservation_id: reservation.id,
                    service_id: reservation.service_id,
                    span: reservation.span,
                });
            }
            Event::ReservationStatusChanged {
                id,
                status: ReservationStatus::Cancelled,
                ..
            } => {
                rs.remove_booking(*id);
            }
            _ => {}
        }
    }
}
