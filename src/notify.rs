use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 1024;

/// In-process broadcast of every committed event of one tenant.
pub struct NotifyHub {
    tx: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DayHours, Event};
    use chrono::NaiveTime;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();

        let event = Event::WorkingHoursSet {
            weekday: 2,
            hours: Some(DayHours {
                open: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                close: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            }),
        };
        hub.send(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&Event::WorkingHoursSet { weekday: 0, hours: None });
    }
}
