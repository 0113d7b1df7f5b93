//! WebSocket-focused test helpers.

use beacon::inbound::ws::{OriginPolicy, WsState};
use beacon::wiring::Services;

/// Build a `WsState` over `services` that admits `origins`.
pub fn ws_state(services: &Services, origins: &[&str]) -> WsState {
    WsState::new(
        services.dispatcher(beacon::domain::CONNECT_SWEEP_DAYS),
        services.auth.clone(),
        OriginPolicy::parse(origins).expect("valid origin rules"),
    )
}
