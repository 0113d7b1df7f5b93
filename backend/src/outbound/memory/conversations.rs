//! In-memory `ConversationRepository`.
//!
//! The index lock serialises creation so a pair never gets two
//! conversations. Each conversation then has its own lock, and message
//! appends push under that lock only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::ports::{ConversationPersistenceError, ConversationRepository};
use crate::domain::{
    Conversation, ConversationId, Message, MessageId, ParticipantPair, UserId, Username,
};

type Document = Arc<Mutex<Conversation>>;

#[derive(Default)]
struct Index {
    by_id: HashMap<ConversationId, Document>,
    by_pair: HashMap<ParticipantPair, ConversationId>,
}

#[derive(Default)]
pub struct MemoryConversationRepository {
    index: Mutex<Index>,
}

impl MemoryConversationRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn document(&self, id: &ConversationId) -> Option<Document> {
        self.index.lock().await.by_id.get(id).cloned()
    }

    async fn documents_for(&self, user: &UserId) -> Vec<Document> {
        let index = self.index.lock().await;
        index
            .by_pair
            .iter()
            .filter(|(pair, _)| pair.contains(user))
            .filter_map(|(_, id)| index.by_id.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn create_if_absent(
        &self,
        candidate: &Conversation,
    ) -> Result<Conversation, ConversationPersistenceError> {
        let mut index = self.index.lock().await;
        if let Some(existing) = index
            .by_pair
            .get(&candidate.participants)
            .and_then(|id| index.by_id.get(id))
            .cloned()
        {
            drop(index);
            return Ok(existing.lock().await.clone());
        }
        index
            .by_pair
            .insert(candidate.participants, candidate.id);
        index
            .by_id
            .insert(candidate.id, Arc::new(Mutex::new(candidate.clone())));
        Ok(candidate.clone())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationPersistenceError> {
        match self.document(id).await {
            Some(document) => Ok(Some(document.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_by_participants(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Option<Conversation>, ConversationPersistenceError> {
        let document = {
            let index = self.index.lock().await;
            index
                .by_pair
                .get(pair)
                .and_then(|id| index.by_id.get(id))
                .cloned()
        };
        match document {
            Some(document) => Ok(Some(document.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, ConversationPersistenceError> {
        let mut conversations = Vec::new();
        for document in self.documents_for(user).await {
            conversations.push(document.lock().await.clone());
        }
        conversations.sort_by_key(|conversation| conversation.created_at);
        Ok(conversations)
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: &Message,
    ) -> Result<bool, ConversationPersistenceError> {
        let Some(document) = self.document(id).await else {
            return Ok(false);
        };
        let mut conversation = document.lock().await;
        conversation.messages.push(message.clone());
        conversation.updated_at = message.created_at;
        Ok(true)
    }

    async fn mark_read(
        &self,
        id: &ConversationId,
        message_ids: &[MessageId],
        now: DateTime<Utc>,
    ) -> Result<u64, ConversationPersistenceError> {
        let Some(document) = self.document(id).await else {
            return Ok(0);
        };
        let mut conversation = document.lock().await;
        let mut changed = 0;
        for message in conversation
            .messages
            .iter_mut()
            .filter(|message| !message.read && message_ids.contains(&message.id))
        {
            message.read = true;
            message.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn set_in_chat(
        &self,
        id: &ConversationId,
        username: &str,
        in_chat: bool,
    ) -> Result<bool, ConversationPersistenceError> {
        let Some(document) = self.document(id).await else {
            return Ok(false);
        };
        document
            .lock()
            .await
            .is_in_chat
            .insert(username.to_owned(), in_chat);
        Ok(true)
    }

    async fn clear_in_chat_for(
        &self,
        user: &UserId,
        username: &str,
    ) -> Result<u64, ConversationPersistenceError> {
        let mut cleared = 0;
        for document in self.documents_for(user).await {
            let mut conversation = document.lock().await;
            if conversation.is_in_chat(username) {
                cleared += 1;
            }
            conversation.is_in_chat.insert(username.to_owned(), false);
        }
        Ok(cleared)
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, ConversationPersistenceError> {
        let mut index = self.index.lock().await;
        let Some(document) = index.by_id.remove(id) else {
            return Ok(false);
        };
        let pair = document.lock().await.participants;
        index.by_pair.remove(&pair);
        Ok(true)
    }

    async fn rename_participant(
        &self,
        user: &UserId,
        old: &str,
        new: &str,
    ) -> Result<u64, ConversationPersistenceError> {
        let new = Username::new(new)
            .map_err(|error| ConversationPersistenceError::query(error.to_string()))?;
        let mut changed = 0;
        for document in self.documents_for(user).await {
            changed += document.lock().await.rename_participant(old, &new);
        }
        Ok(changed)
    }
}
