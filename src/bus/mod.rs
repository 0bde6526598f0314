//! Event bus for session notifications
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! Sessions report through a [`SessionListener`]; [`BusListener`] republishes those callbacks
//! as [`BusEvent`]s for any number of subscribers.

pub mod listener;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::discovery::DeviceDescriptor;
use crate::state::{ChangeType, SessionState};

pub use listener::{BusListener, NullListener, SessionListener};

/// Event types that can be published on the bus
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    /// Coalesced state changes with the snapshot they produced.
    StateChanged {
        host: String,
        port: u16,
        changes: Vec<ChangeType>,
        #[serde(skip)]
        state: Arc<SessionState>,
    },
    ManagerStopped { host: String, port: u16 },
    DeviceDisconnected { host: String, port: u16 },
    DeviceFound(DeviceDescriptor),
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BusEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    /// Default capacity of 256 events
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub() {
        let bus = create_bus();
        let mut rx = bus.subscribe();

        bus.publish(BusEvent::ManagerStopped {
            host: "192.168.1.10".to_string(),
            port: 60128,
        });

        let event = rx.recv().await.unwrap();
        match event {
            BusEvent::ManagerStopped { host, port } => {
                assert_eq!(host, "192.168.1.10");
                assert_eq!(port, 60128);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = create_bus();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(BusEvent::DeviceDisconnected {
            host: "h".to_string(),
            port: 23,
        });

        assert!(matches!(rx1.recv().await.unwrap(), BusEvent::DeviceDisconnected { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), BusEvent::DeviceDisconnected { .. }));
    }

    #[test]
    fn test_event_serialization() {
        let event = BusEvent::StateChanged {
            host: "h".to_string(),
            port: 60128,
            changes: vec![ChangeType::Common, ChangeType::MediaItems],
            state: Arc::new(SessionState::new(Default::default(), "h", 60128, 0)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StateChanged");
        assert_eq!(json["payload"]["changes"][1], "MEDIA_ITEMS");
        assert!(json["payload"].get("state").is_none());
    }
}
