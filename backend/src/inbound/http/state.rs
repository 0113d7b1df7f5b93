//! Shared HTTP adapter state.
//!
//! Handlers receive this through `web::Data` and only talk to domain
//! services, so they stay testable with in-memory adapters.

use crate::domain::{
    AuthGate, ConversationService, DEFAULT_RETENTION_DAYS, NotificationService,
    RelationshipService,
};

/// Services used by HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub relationships: RelationshipService,
    pub conversations: ConversationService,
    pub notifications: NotificationService,
    pub auth: AuthGate,
    /// Read notifications older than this are swept when the user logs in.
    pub retention_days: u32,
}

impl HttpState {
    pub fn new(
        relationships: RelationshipService,
        conversations: ConversationService,
        notifications: NotificationService,
        auth: AuthGate,
    ) -> Self {
        Self {
            relationships,
            conversations,
            notifications,
            auth,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}
