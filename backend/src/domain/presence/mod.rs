//! Presence tracking and room-based fan-out for real-time connections.

mod dispatcher;
mod events;
mod router;

pub use dispatcher::{ConnectionHandle, EventDispatcher, INVALID_NOTIFICATION, INVALID_REQUEST};
pub use events::{ClientCommand, CommandParseError, ServerEvent};
pub use router::{ConnectionId, ConnectionPhase, RoomId, RoomRouter};
