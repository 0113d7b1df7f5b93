//! Shared WebSocket adapter state.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::AuthGate;
use crate::domain::presence::EventDispatcher;
use crate::inbound::ws::origin::OriginPolicy;

/// Ping cadence and the silence after which a socket is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10),
        }
    }
}

/// Dependency bundle for the `/ws` upgrade handler and its sessions.
#[derive(Clone)]
pub struct WsState {
    pub dispatcher: EventDispatcher,
    pub auth: AuthGate,
    pub origins: Arc<OriginPolicy>,
    pub heartbeat: Heartbeat,
}

impl WsState {
    pub fn new(dispatcher: EventDispatcher, auth: AuthGate, origins: OriginPolicy) -> Self {
        Self {
            dispatcher,
            auth,
            origins: Arc::new(origins),
            heartbeat: Heartbeat::default(),
        }
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}
