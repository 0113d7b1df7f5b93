//! In-process room routing.
//!
//! Connections register once, then join rooms keyed by a user or a
//! conversation. A broadcast delivers to every member connection of a room.
//! All state is held in this process.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::events::ServerEvent;
use crate::domain::{ConversationId, UserId};

/// Process-unique handle of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Routing key for a broadcast group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Identity room of a user. Every live connection of the user joins it.
    User(UserId),
    /// Room of everyone currently viewing a conversation.
    Conversation(ConversationId),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

/// Lifecycle of a connection as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    /// Registered but not yet in its identity room.
    Connecting,
    JoinedIdentityRoom,
    /// In its identity room and at least one conversation room.
    JoinedConversationRooms,
}

struct Connection {
    sender: UnboundedSender<ServerEvent>,
    identity: Option<UserId>,
    conversations: HashSet<ConversationId>,
}

impl Connection {
    fn phase(&self) -> ConnectionPhase {
        match (self.identity, self.conversations.is_empty()) {
            (None, _) => ConnectionPhase::Connecting,
            (Some(_), true) => ConnectionPhase::JoinedIdentityRoom,
            (Some(_), false) => ConnectionPhase::JoinedConversationRooms,
        }
    }

    fn rooms(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.identity
            .map(RoomId::User)
            .into_iter()
            .chain(self.conversations.iter().copied().map(RoomId::Conversation))
    }
}

#[derive(Default)]
struct RouterState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RouterState {
    fn remove_member(&mut self, room: RoomId, connection: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&connection);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

/// Maps rooms to the connections subscribed to them.
#[derive(Default)]
pub struct RoomRouter {
    next_id: AtomicU64,
    state: RwLock<RouterState>,
}

impl RoomRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiver its writer drains.
    pub async fn register(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.write().await.connections.insert(
            id,
            Connection {
                sender,
                identity: None,
                conversations: HashSet::new(),
            },
        );
        debug!(connection = %id, "connection registered");
        (id, receiver)
    }

    /// Subscribe a connection to a room.
    ///
    /// Returns false for unknown connections and for an attempt to join a
    /// second, different identity room.
    pub async fn join(&self, connection: ConnectionId, room: RoomId) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(&connection) else {
            return false;
        };
        match room {
            RoomId::User(user) => match entry.identity {
                Some(existing) if existing != user => return false,
                _ => entry.identity = Some(user),
            },
            RoomId::Conversation(conversation) => {
                entry.conversations.insert(conversation);
            }
        }
        state.rooms.entry(room).or_default().insert(connection);
        debug!(connection = %connection, room = %room, "joined room");
        true
    }

    /// Unsubscribe a connection from a room. Returns whether it was a member.
    pub async fn leave(&self, connection: ConnectionId, room: RoomId) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(&connection) else {
            return false;
        };
        let was_member = match room {
            RoomId::User(user) if entry.identity == Some(user) => {
                entry.identity = None;
                true
            }
            RoomId::User(_) => false,
            RoomId::Conversation(conversation) => entry.conversations.remove(&conversation),
        };
        if was_member {
            state.remove_member(room, connection);
        }
        was_member
    }

    /// Leave every room and drop the connection's sender.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.remove(&connection) else {
            return;
        };
        for room in entry.rooms() {
            state.remove_member(room, connection);
        }
        debug!(connection = %connection, "connection removed");
    }

    pub async fn phase(&self, connection: ConnectionId) -> ConnectionPhase {
        self.state
            .read()
            .await
            .connections
            .get(&connection)
            .map_or(ConnectionPhase::Disconnected, Connection::phase)
    }

    /// Deliver `event` to every member of `room`. Returns the delivery count.
    pub async fn broadcast(&self, room: RoomId, event: &ServerEvent) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(&room) else {
            return 0;
        };
        members
            .iter()
            .filter_map(|member| state.connections.get(member))
            .filter(|entry| entry.sender.send(event.clone()).is_ok())
            .count()
    }

    /// Deliver `event` to one connection. Returns whether it was queued.
    pub async fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        self.state
            .read()
            .await
            .connections
            .get(&connection)
            .is_some_and(|entry| entry.sender.send(event).is_ok())
    }

    /// Number of connections in a room.
    pub async fn member_count(&self, room: RoomId) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(&room)
            .map_or(0, HashSet::len)
    }
}
