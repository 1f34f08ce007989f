use tokio::sync::broadcast;

use crate::Event;

/// Event bus shared by every component of one playback session.
///
/// `publish()` is sync and works from the control thread and loader threads
/// alike. Events published without subscribers are dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Bus holding at most `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send `event` to every current subscriber.
    ///
    /// Accepts sub-enum values directly: `bus.publish(SourceEvent::..)`.
    pub fn publish<E: Into<Event>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    /// Receiver for events published from now on.
    ///
    /// Slow subscribers receive `RecvError::Lagged(n)` instead of blocking
    /// producers.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use lyra_core::{MediaPeriodId, PeriodUid};

    use super::*;
    use crate::SourceEvent;

    fn refreshed() -> SourceEvent {
        SourceEvent::SourceInfoRefreshed {
            period_id: MediaPeriodId::new(PeriodUid(1)),
            duration_us: Some(10_000_000),
            is_seekable: true,
            is_live: false,
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(refreshed());
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(refreshed());
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::Source(SourceEvent::SourceInfoRefreshed {
                duration_us: Some(10_000_000),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..10 {
            bus.publish(refreshed());
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn clone_shares_channel() {
        let bus1 = EventBus::new(16);
        let bus2 = bus1.clone();
        let mut rx = bus1.subscribe();
        bus2.publish(refreshed());
        assert!(rx.try_recv().is_ok());
        assert_eq!(bus2.subscriber_count(), 1);
    }
}
