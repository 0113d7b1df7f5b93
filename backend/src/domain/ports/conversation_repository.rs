//! Port for pairwise conversation storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Conversation, ConversationId, Message, MessageId, ParticipantPair, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by conversation repository adapters.
    pub enum ConversationPersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "conversation repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "conversation repository query failed: {message}",
    }
}

/// Storage for conversations and their messages.
///
/// # Atomicity
///
/// - [`ConversationRepository::create_if_absent`] must never produce two
///   conversations for one [`ParticipantPair`]. When a concurrent caller wins,
///   the existing conversation is returned.
/// - [`ConversationRepository::append_message`] pushes a single message
///   without rewriting the conversation, so concurrent appends are all kept.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Store `candidate` unless its pair already has a conversation. Returns
    /// the stored conversation either way.
    async fn create_if_absent(
        &self,
        candidate: &Conversation,
    ) -> Result<Conversation, ConversationPersistenceError>;

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationPersistenceError>;

    async fn find_by_participants(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Option<Conversation>, ConversationPersistenceError>;

    /// Every conversation `user` participates in.
    async fn list_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, ConversationPersistenceError>;

    /// Append a message. Returns `false` when the conversation is absent.
    async fn append_message(
        &self,
        id: &ConversationId,
        message: &Message,
    ) -> Result<bool, ConversationPersistenceError>;

    /// Flip the read flag on the listed messages. Returns how many changed.
    async fn mark_read(
        &self,
        id: &ConversationId,
        message_ids: &[MessageId],
        now: DateTime<Utc>,
    ) -> Result<u64, ConversationPersistenceError>;

    /// Set one participant's presence flag. Returns `false` when absent.
    async fn set_in_chat(
        &self,
        id: &ConversationId,
        username: &str,
        in_chat: bool,
    ) -> Result<bool, ConversationPersistenceError>;

    /// Clear `username`'s presence flag in every conversation of `user`.
    async fn clear_in_chat_for(
        &self,
        user: &UserId,
        username: &str,
    ) -> Result<u64, ConversationPersistenceError>;

    /// Rewrite `old` to `new` in the senders, receivers and presence keys of
    /// every conversation of `user`. Returns how many records changed.
    async fn rename_participant(
        &self,
        user: &UserId,
        old: &str,
        new: &str,
    ) -> Result<u64, ConversationPersistenceError>;

    /// Delete a conversation and its messages. Returns whether it existed.
    async fn delete(&self, id: &ConversationId) -> Result<bool, ConversationPersistenceError>;
}
