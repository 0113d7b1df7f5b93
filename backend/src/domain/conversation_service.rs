//! Conversation domain service.
//!
//! Conversations are looked up by their normalised participant pair so the
//! argument order of callers never matters.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info};

use crate::domain::ports::ConversationRepository;
use crate::domain::service_support::map_conversation_error;
use crate::domain::{
    ContentType, Conversation, ConversationId, Error, Message, MessageId, ParticipantPair, User,
    UserId, Username,
};

/// Outcome of a presence update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceUpdate {
    /// The flag for the requested conversation was written.
    Updated,
    /// The pair were not mutual friends, so every flag of the caller was cleared.
    ClearedAll,
}

#[derive(Clone)]
pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
}

impl ConversationService {
    pub fn new(conversations: Arc<dyn ConversationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations,
            clock,
        }
    }

    fn pair(a: &UserId, b: &UserId) -> Result<ParticipantPair, Error> {
        ParticipantPair::new(*a, *b)
            .ok_or_else(|| Error::invalid_request("a conversation needs two different users"))
    }

    /// Return the conversation between two users, creating it when absent.
    pub async fn find_or_create(&self, a: &User, b: &User) -> Result<Conversation, Error> {
        let pair = Self::pair(&a.id, &b.id)?;
        if let Some(existing) = self
            .conversations
            .find_by_participants(&pair)
            .await
            .map_err(map_conversation_error)?
        {
            return Ok(existing);
        }
        let candidate = Conversation::start(pair, [&a.username, &b.username], self.clock.utc());
        let stored = self
            .conversations
            .create_if_absent(&candidate)
            .await
            .map_err(map_conversation_error)?;
        if stored.id == candidate.id {
            info!(conversation_id = %stored.id, "conversation created");
        }
        Ok(stored)
    }

    pub async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, Error> {
        self.conversations
            .find_by_id(id)
            .await
            .map_err(map_conversation_error)
    }

    pub async fn find_between(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<Conversation>, Error> {
        let pair = Self::pair(a, b)?;
        self.conversations
            .find_by_participants(&pair)
            .await
            .map_err(map_conversation_error)
    }

    /// Append a message. Returns `None` when the conversation does not exist.
    pub async fn append_message(
        &self,
        id: &ConversationId,
        sender: &Username,
        receiver: &Username,
        content: &str,
        content_type: ContentType,
    ) -> Result<Option<Message>, Error> {
        if content.trim().is_empty() {
            return Err(Error::invalid_request("message content must not be empty"));
        }
        let message = Message::new(
            sender.clone(),
            receiver.clone(),
            content.to_owned(),
            content_type,
            self.clock.utc(),
        );
        let stored = self
            .conversations
            .append_message(id, &message)
            .await
            .map_err(map_conversation_error)?;
        if !stored {
            debug!(conversation_id = %id, "append skipped: conversation missing");
            return Ok(None);
        }
        Ok(Some(message))
    }

    /// Messages of a conversation in insertion order.
    pub async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>, Error> {
        self.find(id)
            .await?
            .map(|conversation| conversation.messages)
            .ok_or_else(|| Error::not_found("Conversation not found"))
    }

    /// Mark one message read. Absent messages are a no-op.
    pub async fn mark_read(&self, id: &ConversationId, message: &MessageId) -> Result<bool, Error> {
        Ok(self.mark_many_read(id, std::slice::from_ref(message)).await? > 0)
    }

    pub async fn mark_many_read(
        &self,
        id: &ConversationId,
        messages: &[MessageId],
    ) -> Result<u64, Error> {
        if messages.is_empty() {
            return Ok(0);
        }
        self.conversations
            .mark_read(id, messages, self.clock.utc())
            .await
            .map_err(map_conversation_error)
    }

    pub async fn set_in_chat(
        &self,
        id: &ConversationId,
        username: &Username,
        in_chat: bool,
    ) -> Result<bool, Error> {
        self.conversations
            .set_in_chat(id, username.as_str(), in_chat)
            .await
            .map_err(map_conversation_error)
    }

    /// Clear the user's presence flag in every conversation.
    pub async fn clear_in_chat_for(&self, user: &User) -> Result<u64, Error> {
        self.conversations
            .clear_in_chat_for(&user.id, user.username.as_str())
            .await
            .map_err(map_conversation_error)
    }

    #[must_use]
    pub fn is_in_chat(conversation: &Conversation, username: &Username) -> bool {
        conversation.is_in_chat(username.as_str())
    }

    /// Record whether `user` is viewing the chat with `friend`.
    ///
    /// Only mutual friends get a per-conversation flag. Otherwise all of the
    /// user's flags are cleared.
    pub async fn update_presence(
        &self,
        user: &User,
        friend: Option<&User>,
        in_chat: bool,
    ) -> Result<PresenceUpdate, Error> {
        match friend {
            Some(friend) if user.is_friend_of(&friend.id) && friend.is_friend_of(&user.id) => {
                let conversation = self.find_or_create(user, friend).await?;
                self.set_in_chat(&conversation.id, &user.username, in_chat)
                    .await?;
                Ok(PresenceUpdate::Updated)
            }
            _ => {
                self.clear_in_chat_for(user).await?;
                Ok(PresenceUpdate::ClearedAll)
            }
        }
    }

    /// Whether `friend` is currently viewing their chat with `user`.
    pub async fn friend_in_chat(&self, user: &User, friend: &User) -> Result<bool, Error> {
        Ok(self
            .find_between(&user.id, &friend.id)
            .await?
            .is_some_and(|conversation| Self::is_in_chat(&conversation, &friend.username)))
    }

    /// Whether `user` has an unread message from `friend`.
    pub async fn has_unread_from(&self, user: &User, friend: &UserId) -> Result<bool, Error> {
        if user.id == *friend {
            return Ok(false);
        }
        Ok(self
            .find_between(&user.id, friend)
            .await?
            .is_some_and(|conversation| conversation.has_unread_for(user.username.as_str())))
    }

    /// Delete a conversation. Callers must enforce the mutual-unfriend rule.
    pub(crate) async fn delete(&self, id: &ConversationId) -> Result<bool, Error> {
        let deleted = self
            .conversations
            .delete(id)
            .await
            .map_err(map_conversation_error)?;
        if deleted {
            info!(conversation_id = %id, "conversation deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "conversation_service_tests.rs"]
mod tests;
