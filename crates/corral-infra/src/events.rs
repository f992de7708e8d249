//! Session transition events.
//!
//! The session module stays independent of the bridge: transitions publish
//! onto this bus and interested parties subscribe. Lagging subscribers lose
//! old events rather than blocking the publisher.

use tokio::sync::broadcast;

use corral_shared::schemas::session::TransitionRecord;

const CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: u64,
    pub transition: TransitionRecord,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<SessionEvent> {
        self.tx.clone()
    }

    /// Publish; a bus with no subscribers swallows the event.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_shared::schemas::session::{SessionAction, SessionStatus};

    #[tokio::test]
    async fn subscribers_see_published_transitions() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let event = SessionEvent {
            session_id: 3,
            transition: TransitionRecord {
                action: SessionAction::Start,
                from: SessionStatus::Pending,
                to: SessionStatus::Running,
                timestamp: 1,
            },
        };
        bus.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(SessionEvent {
            session_id: 1,
            transition: TransitionRecord {
                action: SessionAction::Stop,
                from: SessionStatus::Running,
                to: SessionStatus::Stopped,
                timestamp: 2,
            },
        });
    }
}
