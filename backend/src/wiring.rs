//! Service composition over a chosen set of adapters.
//!
//! The server binary picks adapters from settings and hands them to
//! [`Services::new`]; tests do the same with in-memory stores.

use std::sync::Arc;

use mockable::Clock;

use crate::domain::ports::{
    AvatarStore, ConversationRepository, NotificationLog, PasswordHasher, UserRepository,
};
use crate::domain::presence::{EventDispatcher, RoomRouter};
use crate::domain::{AuthGate, ConversationService, NotificationService, RelationshipService};
use crate::inbound::http::state::HttpState;
use crate::outbound::memory::{
    MemoryConversationRepository, MemoryNotificationLog, MemoryUserRepository,
};

/// Port implementations shared by every service.
#[derive(Clone)]
pub struct Adapters {
    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub notifications: Arc<dyn NotificationLog>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub avatars: Arc<dyn AvatarStore>,
    pub clock: Arc<dyn Clock>,
}

impl Adapters {
    /// In-process stores. Data lives as long as the process.
    pub fn in_memory(
        hasher: Arc<dyn PasswordHasher>,
        avatars: Arc<dyn AvatarStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users: Arc::new(MemoryUserRepository::new()),
            conversations: Arc::new(MemoryConversationRepository::new()),
            notifications: Arc::new(MemoryNotificationLog::new()),
            hasher,
            avatars,
            clock,
        }
    }
}

/// Domain services plus the room router backing real-time delivery.
#[derive(Clone)]
pub struct Services {
    pub relationships: RelationshipService,
    pub conversations: ConversationService,
    pub notifications: NotificationService,
    pub auth: AuthGate,
    pub router: Arc<RoomRouter>,
}

impl Services {
    pub fn new(adapters: Adapters) -> Self {
        let Adapters {
            users,
            conversations,
            notifications,
            hasher,
            avatars,
            clock,
        } = adapters;

        let conversation_service = ConversationService::new(conversations.clone(), clock.clone());
        let relationships = RelationshipService::new(
            users.clone(),
            conversations,
            notifications.clone(),
            hasher.clone(),
            avatars,
            clock.clone(),
        );
        let auth = AuthGate::new(users, hasher, conversation_service.clone(), clock.clone());
        Self {
            relationships,
            conversations: conversation_service,
            notifications: NotificationService::new(notifications, clock),
            auth,
            router: Arc::new(RoomRouter::new()),
        }
    }

    pub fn http_state(&self) -> HttpState {
        HttpState::new(
            self.relationships.clone(),
            self.conversations.clone(),
            self.notifications.clone(),
            self.auth.clone(),
        )
    }

    /// Dispatcher sharing this instance's router.
    pub fn dispatcher(&self, connect_sweep_days: u32) -> EventDispatcher {
        EventDispatcher::new(
            self.relationships.clone(),
            self.conversations.clone(),
            self.notifications.clone(),
            self.auth.clone(),
            self.router.clone(),
        )
        .with_connect_sweep_days(connect_sweep_days)
    }
}
