use async_trait::async_trait;
use std::sync::Arc;

use crate::bus::{BusEvent, SharedBus};
use crate::state::{ChangeType, SessionState};

/// Outward callbacks of a running session.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// Batch of changes collected during one coalescing window.
    async fn on_state_changed(&self, state: Arc<SessionState>, changes: Vec<ChangeType>);

    /// The session loop ended, for whatever reason.
    async fn on_manager_stopped(&self, host: &str, port: u16);

    /// The primary connection was lost.
    async fn on_device_disconnected(&self, host: &str, port: u16);
}

/// Republishes session callbacks on the event bus.
pub struct BusListener {
    bus: SharedBus,
}

impl BusListener {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl SessionListener for BusListener {
    async fn on_state_changed(&self, state: Arc<SessionState>, changes: Vec<ChangeType>) {
        self.bus.publish(BusEvent::StateChanged {
            host: state.host.clone(),
            port: state.port,
            changes,
            state,
        });
    }

    async fn on_manager_stopped(&self, host: &str, port: u16) {
        self.bus.publish(BusEvent::ManagerStopped {
            host: host.to_string(),
            port,
        });
    }

    async fn on_device_disconnected(&self, host: &str, port: u16) {
        self.bus.publish(BusEvent::DeviceDisconnected {
            host: host.to_string(),
            port,
        });
    }
}

/// Ignores every callback.
pub struct NullListener;

#[async_trait]
impl SessionListener for NullListener {
    async fn on_state_changed(&self, _state: Arc<SessionState>, _changes: Vec<ChangeType>) {}

    async fn on_manager_stopped(&self, _host: &str, _port: u16) {}

    async fn on_device_disconnected(&self, _host: &str, _port: u16) {}
}
