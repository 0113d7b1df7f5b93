//! Per-event state mutation and fan-out for real-time connections.
//!
//! The dispatcher is transport agnostic: an inbound adapter registers a
//! connection through [`EventDispatcher::connect`], feeds it text frames
//! through [`EventDispatcher::handle`], and drains the returned receiver.
//! Acknowledgements go to the originating connection only. Alerts for
//! another user go to that user's identity room.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::events::{ClientCommand, ServerEvent};
use super::router::{ConnectionId, RoomId, RoomRouter};
use crate::domain::auth_gate::AuthGate;
use crate::domain::conversation_service::ConversationService;
use crate::domain::notification_service::{CONNECT_SWEEP_DAYS, NotificationService};
use crate::domain::relationship_service::RelationshipService;
use crate::domain::{
    ContentType, ConversationId, Error, ErrorCode, NotificationId, User, UserId, looks_like_email,
};

/// Text sent for frames that cannot be parsed.
pub const INVALID_REQUEST: &str = "Invalid request";

/// Text sent when a notification id is not in the caller's log.
pub const INVALID_NOTIFICATION: &str = "Invalid notification";

/// A registered connection and the events queued for it.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub events: UnboundedReceiver<ServerEvent>,
}

#[derive(Clone)]
pub struct EventDispatcher {
    relationships: RelationshipService,
    conversations: ConversationService,
    notifications: NotificationService,
    gate: AuthGate,
    router: Arc<RoomRouter>,
    connect_sweep_days: u32,
}

impl EventDispatcher {
    pub fn new(
        relationships: RelationshipService,
        conversations: ConversationService,
        notifications: NotificationService,
        gate: AuthGate,
        router: Arc<RoomRouter>,
    ) -> Self {
        Self {
            relationships,
            conversations,
            notifications,
            gate,
            router,
            connect_sweep_days: CONNECT_SWEEP_DAYS,
        }
    }

    /// Override the threshold of the sweep run on connect.
    #[must_use]
    pub fn with_connect_sweep_days(mut self, days: u32) -> Self {
        self.connect_sweep_days = days;
        self
    }

    #[must_use]
    pub fn router(&self) -> &Arc<RoomRouter> {
        &self.router
    }

    /// Register an authenticated connection.
    ///
    /// Joins the user's identity room, raises a single `alert_user` when
    /// unread notifications exist, and sweeps old read notifications. A
    /// failed connect leaves no trace in the router.
    pub async fn connect(&self, user: &User) -> Result<ConnectionHandle, Error> {
        let (id, events) = self.router.register().await;
        self.router.join(id, RoomId::User(user.id)).await;

        match self.notifications.has_unread(&user.id).await {
            Ok(true) => {
                self.router.send_to(id, ServerEvent::AlertUser).await;
            }
            Ok(false) => {}
            Err(error) => {
                self.router.disconnect(id).await;
                return Err(error);
            }
        }
        info!(connection = %id, user_id = %user.id, "real-time connection opened");

        if let Err(error) = self
            .notifications
            .sweep(&user.id, self.connect_sweep_days)
            .await
        {
            warn!(user_id = %user.id, error = %error, "notification sweep failed");
        }
        if let Err(error) = self.relationships.touch_last_seen(&user.id).await {
            warn!(user_id = %user.id, error = %error, "failed to record last seen");
        }
        Ok(ConnectionHandle { id, events })
    }

    /// Leave every room. No further events reach the connection.
    pub async fn disconnect(&self, connection: ConnectionId, user_id: &UserId) {
        self.router.disconnect(connection).await;
        info!(connection = %connection, user_id = %user_id, "real-time connection closed");
    }

    /// Process one text frame from `connection`.
    ///
    /// Failures are reported to the connection as `error` events and never
    /// close it.
    pub async fn handle(&self, connection: ConnectionId, user_id: &UserId, frame: &str) {
        let command = match ClientCommand::parse(frame) {
            Ok(command) => command,
            Err(error) => {
                debug!(connection = %connection, error = %error, "rejected frame");
                self.reply(connection, ServerEvent::error(INVALID_REQUEST))
                    .await;
                return;
            }
        };
        let name = command.name();
        let result = match self.relationships.load(user_id).await {
            Ok(user) => self.dispatch(connection, &user, command).await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            debug!(connection = %connection, event = name, error = %error, "event failed");
            self.reply(connection, ServerEvent::error(client_message(&error)))
                .await;
        }
    }

    async fn dispatch(
        &self,
        connection: ConnectionId,
        user: &User,
        command: ClientCommand,
    ) -> Result<(), Error> {
        match command {
            ClientCommand::Join { room, .. } => self.join(connection, user, room).await,
            ClientCommand::NewMessage {
                room,
                friend,
                message,
                content_type,
            } => {
                self.new_message(user, room, &friend, &message, content_type)
                    .await
            }
            ClientCommand::NewFriendRequest { data } => {
                self.friend_request(connection, user, &data).await
            }
            ClientCommand::AcceptedRequest { friend, id } => {
                self.accept_request(connection, user, &friend, id).await
            }
            ClientCommand::GetFriendRequests => {
                let data = self.notifications.list_friend_requests(&user.id).await?;
                self.reply(connection, ServerEvent::UserFriendRequests { data })
                    .await;
                Ok(())
            }
            ClientCommand::GetGeneralNotifications => {
                let data = self.notifications.list_general(&user.id).await?;
                self.reply(connection, ServerEvent::ShowGeneralNotifications { data })
                    .await;
                Ok(())
            }
            ClientCommand::MarkAsRead { id } => {
                if !self.notifications.mark_read(&user.id, id).await? {
                    return Err(Error::not_found(INVALID_NOTIFICATION));
                }
                self.reply(connection, ServerEvent::BlurrRead { id }).await;
                Ok(())
            }
            ClientCommand::DeleteFriendRequest { id } => {
                if !self.notifications.delete(&user.id, id).await? {
                    return Err(Error::not_found(INVALID_NOTIFICATION));
                }
                self.reply(connection, ServerEvent::ReloadFriendRequest)
                    .await;
                Ok(())
            }
            ClientCommand::AllowedTrack { friend } => self.allow_track(user, &friend).await,
            ClientCommand::DisallowedTrack { friend } => self.disallow_track(user, &friend).await,
            ClientCommand::VerifyToDelete { friend } => {
                self.verify_to_delete(connection, user, &friend).await
            }
            ClientCommand::ReloadProfile { friend } => self.reload_profile(user, &friend).await,
            ClientCommand::SendErrorMessage { message } => {
                self.reply(connection, ServerEvent::error(message)).await;
                Ok(())
            }
            ClientCommand::SendSuccessMessage { message } => {
                self.reply(connection, ServerEvent::success(message)).await;
                Ok(())
            }
        }
    }

    async fn reply(&self, connection: ConnectionId, event: ServerEvent) {
        if !self.router.send_to(connection, event).await {
            debug!(connection = %connection, "reply dropped: connection gone");
        }
    }

    async fn alert(&self, user_id: &UserId, event: ServerEvent) {
        self.router.broadcast(RoomId::User(*user_id), &event).await;
    }

    async fn friend_named(&self, raw: &str) -> Result<User, Error> {
        let raw = raw.trim();
        self.relationships
            .find_by_username(raw)
            .await?
            .ok_or_else(|| Error::not_found(format!("Username {raw} does not exist")))
    }

    async fn join(
        &self,
        connection: ConnectionId,
        user: &User,
        room: ConversationId,
    ) -> Result<(), Error> {
        let conversation = self
            .conversations
            .find(&room)
            .await?
            .filter(|conversation| conversation.participants.contains(&user.id))
            .ok_or_else(|| Error::forbidden("You are not part of this conversation"))?;
        self.router
            .join(connection, RoomId::Conversation(conversation.id))
            .await;
        self.reply(
            connection,
            ServerEvent::PrevMessages {
                messages: conversation.messages,
            },
        )
        .await;
        Ok(())
    }

    async fn new_message(
        &self,
        user: &User,
        room: ConversationId,
        friend: &str,
        content: &str,
        content_type: ContentType,
    ) -> Result<(), Error> {
        let friend = self.friend_named(friend).await?;
        let conversation = self
            .conversations
            .find(&room)
            .await?
            .filter(|conversation| {
                conversation.participants.contains(&user.id)
                    && conversation.participants.contains(&friend.id)
            })
            .ok_or_else(|| Error::not_found("Conversation not found"))?;
        let message = self
            .conversations
            .append_message(
                &conversation.id,
                &user.username,
                &friend.username,
                content,
                content_type,
            )
            .await?
            .ok_or_else(|| Error::not_found("Conversation not found"))?;
        self.router
            .broadcast(
                RoomId::Conversation(conversation.id),
                &ServerEvent::Chat {
                    message,
                    sender: user.username.clone(),
                },
            )
            .await;
        Ok(())
    }

    async fn friend_request(
        &self,
        connection: ConnectionId,
        user: &User,
        reference: &str,
    ) -> Result<(), Error> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::invalid_request("Enter a username or email"));
        }
        let Some(recipient) = self.relationships.find_by_reference(reference).await? else {
            let message = if looks_like_email(reference) {
                format!("No user with email: {reference}")
            } else {
                format!("Username {reference} does not exist")
            };
            return Err(Error::not_found(message));
        };
        if recipient.id == user.id {
            return Err(Error::invalid_request("You cannot add yourself as a friend!"));
        }
        if user.is_friend_of(&recipient.id) {
            return Err(Error::conflict(format!(
                "{} is already your friend",
                recipient.username
            )));
        }

        self.notifications
            .send_friend_request(user, &recipient)
            .await?;
        self.alert(&recipient.id, ServerEvent::AlertUser).await;
        self.reply(
            connection,
            ServerEvent::success("Your request has been sent successfully!"),
        )
        .await;
        Ok(())
    }

    async fn accept_request(
        &self,
        connection: ConnectionId,
        user: &User,
        friend: &str,
        request: NotificationId,
    ) -> Result<(), Error> {
        let friend = self.friend_named(friend).await?;
        self.relationships.add_friend(&user.id, &friend.id).await?;
        self.notifications
            .notify_general(
                user,
                &friend,
                format!("{} accepted your friend request", user.username),
            )
            .await?;
        self.alert(&friend.id, ServerEvent::AlertUser).await;
        self.alert(&friend.id, ServerEvent::ReloadGeneralNotification)
            .await;
        self.reply(
            connection,
            ServerEvent::success(format!("You are now friends with {}", friend.username)),
        )
        .await;

        if self.notifications.delete(&user.id, request).await? {
            self.reply(connection, ServerEvent::ReloadFriendRequest)
                .await;
        }
        Ok(())
    }

    async fn allow_track(&self, user: &User, friend: &str) -> Result<(), Error> {
        let friend = self.friend_named(friend).await?;
        self.relationships.allow_track(&user.id, &friend.id).await?;
        self.notifications
            .notify_general(
                user,
                &friend,
                format!("{} granted you access to track them", user.username),
            )
            .await?;
        self.notifications
            .notify_general(
                &friend,
                user,
                format!("You allowed {} to track you", friend.username),
            )
            .await?;
        self.alert(&friend.id, ServerEvent::AlertUser).await;
        self.alert(&user.id, ServerEvent::AlertUser).await;
        Ok(())
    }

    async fn disallow_track(&self, user: &User, friend: &str) -> Result<(), Error> {
        let friend = self.friend_named(friend).await?;
        match self.relationships.revoke_track(&user.id, &friend.id).await {
            Ok(()) => {}
            Err(error) if error.code() == ErrorCode::NotFound => {
                debug!(user_id = %user.id, friend_id = %friend.id, "grant already revoked");
            }
            Err(error) => return Err(error),
        }
        self.notifications
            .notify_general(
                &friend,
                user,
                format!("You disallowed {} from tracking you", friend.username),
            )
            .await?;
        self.alert(&user.id, ServerEvent::AlertUser).await;
        Ok(())
    }

    async fn verify_to_delete(
        &self,
        connection: ConnectionId,
        user: &User,
        friend: &str,
    ) -> Result<(), Error> {
        let friend = self.friend_named(friend).await?;
        if self.gate.confirm_and_delete(&user.id, &friend.id).await? {
            self.reply(connection, ServerEvent::success("Conversation deleted"))
                .await;
            Ok(())
        } else {
            Err(Error::conflict(format!(
                "You are still friends with {}",
                friend.username
            )))
        }
    }

    async fn reload_profile(&self, user: &User, friend: &str) -> Result<(), Error> {
        let friend = self.friend_named(friend).await?;
        self.notifications
            .notify_general(
                user,
                &friend,
                format!("{} updated their profile", user.username),
            )
            .await?;
        self.alert(&friend.id, ServerEvent::AlertUser).await;
        self.alert(&friend.id, ServerEvent::ProfileReload).await;
        self.alert(&user.id, ServerEvent::ProfileReload).await;
        Ok(())
    }
}

/// Client-facing text for a failed event. Internal details are withheld.
fn client_message(error: &Error) -> String {
    match error.code() {
        ErrorCode::InternalError => "Internal server error".to_owned(),
        ErrorCode::ServiceUnavailable => "Service temporarily unavailable".to_owned(),
        _ => error.message().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use mockable::DefaultClock;

    use super::*;
    use crate::domain::ports::{
        FixtureAvatarStore, FixturePasswordHasher, MockNotificationLog, NotificationLogError,
    };
    use crate::domain::{Email, Username};
    use crate::outbound::memory::{MemoryConversationRepository, MemoryUserRepository};
    use crate::wiring::{Adapters, Services};

    fn alice() -> User {
        User::register(
            UserId::random(),
            Username::new("alice").expect("valid username"),
            "Alice".to_owned(),
            Email::new("alice@example.com").expect("valid email"),
            "hash".to_owned(),
            Utc::now(),
        )
    }

    fn dispatcher_over(log: MockNotificationLog) -> EventDispatcher {
        Services::new(Adapters {
            users: Arc::new(MemoryUserRepository::new()),
            conversations: Arc::new(MemoryConversationRepository::new()),
            notifications: Arc::new(log),
            hasher: Arc::new(FixturePasswordHasher),
            avatars: Arc::new(FixtureAvatarStore),
            clock: Arc::new(DefaultClock),
        })
        .dispatcher(CONNECT_SWEEP_DAYS)
    }

    #[tokio::test]
    async fn failed_connect_leaves_the_identity_room_empty() {
        let mut log = MockNotificationLog::new();
        log.expect_list()
            .returning(|_| Err(NotificationLogError::connection("down")));
        log.expect_sweep().never();
        let dispatcher = dispatcher_over(log);
        let user = alice();

        let result = dispatcher.connect(&user).await;

        assert!(result.is_err());
        assert_eq!(
            dispatcher.router().member_count(RoomId::User(user.id)).await,
            0
        );
    }

    #[tokio::test]
    async fn sweep_failures_do_not_refuse_the_connection() {
        let mut log = MockNotificationLog::new();
        log.expect_list().returning(|_| Ok(Vec::new()));
        log.expect_sweep()
            .times(1)
            .returning(|_, _, _| Err(NotificationLogError::query("timeout")));
        let dispatcher = dispatcher_over(log);
        let user = alice();

        let handle = dispatcher.connect(&user).await.expect("connected");

        assert_eq!(
            dispatcher.router().member_count(RoomId::User(user.id)).await,
            1
        );
        dispatcher.disconnect(handle.id, &user.id).await;
    }
}
