//! Side effects of reservation changes (confirmation mail, calendar sync).
//!
//! The dispatcher follows the tenant's [`NotifyHub`](crate::notify::NotifyHub)
//! after commit. Deliveries are retried with exponential backoff and then
//! dropped with an error log; they never feed back into admission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::model::{Event, ReservationStatus};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Created,
    StatusChanged,
}

/// What a customer-facing side effect needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub reservation_id: Ulid,
    pub service_id: Ulid,
    pub status: ReservationStatus,
    /// Known for new reservations only.
    pub recipient: Option<String>,
}

impl Notice {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::ReservationAdmitted { reservation } => Some(Notice {
                kind: NoticeKind::Created,
                reservation_id: reservation.id,
                service_id: reservation.service_id,
                status: reservation.status,
                recipient: Some(reservation.customer.email.clone()),
            }),
            Event::ReservationStatusChanged { id, service_id, status } => Some(Notice {
                kind: NoticeKind::StatusChanged,
                reservation_id: *id,
                service_id: *service_id,
                status: *status,
                recipient: None,
            }),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Courier: Send + Sync {
    async fn deliver(&self, tenant: &str, notice: &Notice) -> Result<(), DeliveryError>;
}

/// Writes notices to the log. Stands in until a mail or calendar backend is wired.
pub struct LogCourier;

#[async_trait]
impl Courier for LogCourier {
    async fn deliver(&self, tenant: &str, notice: &Notice) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(notice)?;
        info!(tenant, %payload, "outbox notice");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

pub async fn deliver_with_retry(
    courier: &dyn Courier,
    tenant: &str,
    notice: &Notice,
    policy: RetryPolicy,
) -> Result<(), DeliveryError> {
    let mut attempt = 0;
    loop {
        match courier.deliver(tenant, notice).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 >= policy.attempts => {
                metrics::counter!(crate::observability::OUTBOX_FAILURES_TOTAL).increment(1);
                error!(
                    tenant,
                    reservation_id = %notice.reservation_id,
                    error = %e,
                    "outbox delivery failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                warn!(
                    tenant,
                    reservation_id = %notice.reservation_id,
                    error = %e,
                    attempt = attempt + 1,
                    "outbox delivery failed, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Per-tenant dispatcher task. Runs until cancelled or the hub goes away.
pub async fn run_dispatcher(
    tenant: String,
    mut rx: broadcast::Receiver<Event>,
    courier: Arc<dyn Courier>,
    policy: RetryPolicy,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = rx.recv() => r,
        };
        match received {
            Ok(event) => {
                if let Some(notice) = Notice::from_event(&event) {
                    let _ = deliver_with_retry(courier.as_ref(), &tenant, &notice, policy).await;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(tenant, skipped, "outbox fell behind, notices dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    /// Fails the first `failures` calls, then forwards notices to a channel.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        tx: mpsc::UnboundedSender<Notice>,
    }

    #[async_trait]
    impl Courier for Flaky {
        async fn deliver(&self, _tenant: &str, notice: &Notice) -> Result<(), DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(DeliveryError::Transport("smtp down".into()));
            }
            let _ = self.tx.send(notice.clone());
            Ok(())
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn admitted() -> Event {
        Event::ReservationAdmitted {
            reservation: Reservation {
                id: Ulid::new(),
                service_id: Ulid::new(),
                resource_id: None,
                span: Span::new(1_000, 2_000),
                stay: None,
                party_size: None,
                status: ReservationStatus::Pending,
                customer: Customer {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                    phone: None,
                },
                notes: None,
                created_at: 0,
            },
        }
    }

    #[test]
    fn notices_only_for_reservations() {
        let notice = Notice::from_event(&admitted()).unwrap();
        assert_eq!(notice.kind, NoticeKind::Created);
        assert_eq!(notice.recipient.as_deref(), Some("ada@example.com"));
        assert!(Notice::from_event(&Event::WorkingHoursSet { weekday: 0, hours: None }).is_none());

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "created");
        assert_eq!(json["status"], "Pending");
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let courier = Flaky { failures: 2, calls: AtomicU32::new(0), tx };
        let notice = Notice::from_event(&admitted()).unwrap();

        deliver_with_retry(&courier, "t", &notice, fast()).await.unwrap();
        assert_eq!(courier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(rx.recv().await.unwrap(), notice);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let courier = Flaky { failures: 10, calls: AtomicU32::new(0), tx };
        let notice = Notice::from_event(&admitted()).unwrap();

        let result = deliver_with_retry(&courier, "t", &notice, fast()).await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
        assert_eq!(courier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatcher_follows_hub_and_stops() {
        let hub = NotifyHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let courier = Arc::new(Flaky { failures: 1, calls: AtomicU32::new(0), tx });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_dispatcher(
            "t".into(),
            hub.subscribe(),
            courier,
            fast(),
            cancel.clone(),
        ));

        hub.send(&Event::WorkingHoursSet { weekday: 0, hours: None });
        let event = admitted();
        hub.send(&event);
        let delivered = rx.recv().await.unwrap();
        assert_eq!(Some(delivered), Notice::from_event(&event));

        cancel.cancel();
        task.await.unwrap();
    }
}
