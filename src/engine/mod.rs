mod admission;
pub mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod store;

pub use admission::{ReservationRequest, RequestedWindow};
pub use availability::{DayPlan, NightDay, Slot};
pub use error::EngineError;
pub use store::{InMemoryStore, ProfileState, SharedResourceState, SharedServiceState};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::time::{Clock, SystemClock};
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued, then
/// writes the whole batch with a single fsync and answers every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so no half-written batch lingers in
    // the buffer for the next one.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// One business profile: its configuration, services, resources and
/// reservation ledger, backed by a single WAL.
pub struct Engine {
    pub profile: RwLock<ProfileState>,
    pub store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_clock(wal_path, notify, Arc::new(SystemClock))
    }

    pub fn with_clock(wal_path: PathBuf, notify: Arc<NotifyHub>, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            profile: RwLock::new(ProfileState::default()),
            store: InMemoryStore::new(),
            wal_tx,
            notify,
            clock,
        };
        for event in &events {
            engine.replay_event(event);
        }
        Ok(engine)
    }

    /// Apply one replayed event. We are the sole owner of every lock here, so
    /// the `try_*` calls always succeed; blocking variants would panic when
    /// replay runs inside the runtime (lazy tenant creation).
    fn replay_event(&self, event: &Event) {
        match event {
            Event::ProfileUpdated { .. } | Event::WorkingHoursSet { .. } => {
                let mut profile = self.profile.try_write().expect("replay: uncontended profile");
                profile.apply_event(event);
            }
            Event::ServiceCreated { service } => self.store.insert_service(service.clone()),
            Event::ResourceCreated { resource } => self.store.insert_resource(resource.clone()),
            Event::ResourceUpdated { resource } => {
                if let Some(rs) = self.store.get_resource(&resource.id) {
                    let mut guard = rs.try_write().expect("replay: uncontended resource");
                    self.store.apply_to_resource(&mut guard, event);
                }
            }
            Event::ServiceUpdated { .. }
            | Event::ResourceAssigned { .. }
            | Event::ResourceUnassigned { .. }
            | Event::ReservationAdmitted { .. }
            | Event::ReservationStatusChanged { .. } => {
                let Some(ss) = event.service_id().and_then(|id| self.store.get_service(&id)) else {
                    return;
                };
                let mut guard = ss.try_write().expect("replay: uncontended service");
                let bound = match event {
                    Event::ReservationAdmitted { reservation } => reservation.resource_id,
                    Event::ReservationStatusChanged { id, .. } => {
                        guard.reservation_mut(*id).and_then(|r| r.resource_id)
                    }
                    _ => None,
                };
                self.store.apply_to_service(&mut guard, event);
                if let Some(rs) = bound.and_then(|rid| self.store.get_resource(&rid)) {
                    let mut rguard = rs.try_write().expect("replay: uncontended resource");
                    self.store.apply_to_resource(&mut rguard, event);
                }
            }
        }
    }

    pub fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply to one service + notify.
    pub(super) async fn persist_and_apply(&self, ss: &mut ServiceState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_service(ss, event);
        self.notify.send(event);
        Ok(())
    }

    pub(super) fn service(&self, id: &Ulid) -> Result<SharedServiceState, EngineError> {
        self.store.get_service(id).ok_or(EngineError::NotFound(*id))
    }

    pub(super) fn resource(&self, id: &Ulid) -> Result<SharedResourceState, EngineError> {
        self.store.get_resource(id).ok_or(EngineError::NotFound(*id))
    }

    /// Service that owns a reservation.
    pub(super) fn service_of(&self, reservation_id: &Ulid) -> Result<SharedServiceState, EngineError> {
        let service_id = self
            .store
            .service_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        self.service(&service_id)
    }
}
