//! PostgreSQL-backed `ConversationRepository`.
//!
//! The `(participant_low, participant_high)` unique key makes creation
//! race-free: the loser's insert is a no-op and both callers read back the
//! same row. Messages are separate rows, so an append is a single insert.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{ConversationPersistenceError, ConversationRepository};
use crate::domain::{
    ContentType, Conversation, ConversationId, Message, MessageId, ParticipantPair, UserId,
    Username,
};

use super::diesel_error_mapping::{Failure, classify, pool_message};
use super::models::{ConversationRow, MessageRow, PresenceRow};
use super::pool::{DbPool, PoolError};
use super::schema::{conversation_presence, conversations, messages};

#[derive(Clone)]
pub struct DieselConversationRepository {
    pool: DbPool,
}

impl DieselConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ConversationPersistenceError {
    ConversationPersistenceError::connection(pool_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> ConversationPersistenceError {
    match classify(error) {
        Failure::Connection(message) => ConversationPersistenceError::connection(message),
        Failure::Query(message) => ConversationPersistenceError::query(message),
        Failure::UniqueViolation { .. } => {
            ConversationPersistenceError::query("unique constraint violated")
        }
        Failure::ForeignKeyViolation => {
            ConversationPersistenceError::query("foreign key violation")
        }
    }
}

fn invalid_row(column: &str, error: impl std::fmt::Display) -> ConversationPersistenceError {
    ConversationPersistenceError::query(format!("stored {column} is invalid: {error}"))
}

fn message_row(conversation: &ConversationId, message: &Message) -> MessageRow {
    MessageRow {
        id: *message.id.as_uuid(),
        conversation_id: *conversation.as_uuid(),
        sender: message.sender.as_str().to_owned(),
        receiver: message.receiver.as_str().to_owned(),
        content: message.content.clone(),
        content_type: message.content_type.as_str().to_owned(),
        read: message.read,
        created_at: message.created_at,
        updated_at: message.updated_at,
    }
}

fn row_to_message(row: MessageRow) -> Result<Message, ConversationPersistenceError> {
    Ok(Message {
        id: MessageId::from_uuid(row.id),
        sender: Username::new(row.sender).map_err(|err| invalid_row("sender", err))?,
        receiver: Username::new(row.receiver).map_err(|err| invalid_row("receiver", err))?,
        content: row.content,
        content_type: ContentType::from_stored(&row.content_type),
        read: row.read,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_conversation(
    row: ConversationRow,
    message_rows: Vec<MessageRow>,
    presence_rows: Vec<PresenceRow>,
) -> Result<Conversation, ConversationPersistenceError> {
    let participants = ParticipantPair::new(
        UserId::from_uuid(row.participant_low),
        UserId::from_uuid(row.participant_high),
    )
    .ok_or_else(|| invalid_row("participants", "both participants are the same user"))?;
    let messages = message_rows
        .into_iter()
        .map(row_to_message)
        .collect::<Result<Vec<_>, _>>()?;
    let is_in_chat: BTreeMap<String, bool> = presence_rows
        .into_iter()
        .map(|presence| (presence.username, presence.in_chat))
        .collect();
    Ok(Conversation {
        id: ConversationId::from_uuid(row.id),
        participants,
        messages,
        is_in_chat,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Load messages and presence flags for `rows` and assemble conversations in
/// the same order.
async fn hydrate(
    conn: &mut AsyncPgConnection,
    rows: Vec<ConversationRow>,
) -> Result<Vec<Conversation>, ConversationPersistenceError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

    let message_rows: Vec<MessageRow> = messages::table
        .filter(messages::conversation_id.eq_any(&ids))
        .order_by(messages::position)
        .select(MessageRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;
    let presence_rows: Vec<PresenceRow> = conversation_presence::table
        .filter(conversation_presence::conversation_id.eq_any(&ids))
        .select(PresenceRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;

    let mut grouped_messages: HashMap<Uuid, Vec<MessageRow>> = HashMap::new();
    for row in message_rows {
        grouped_messages.entry(row.conversation_id).or_default().push(row);
    }
    let mut grouped_presence: HashMap<Uuid, Vec<PresenceRow>> = HashMap::new();
    for row in presence_rows {
        grouped_presence.entry(row.conversation_id).or_default().push(row);
    }

    rows.into_iter()
        .map(|row| {
            let message_rows = grouped_messages.remove(&row.id).unwrap_or_default();
            let presence_rows = grouped_presence.remove(&row.id).unwrap_or_default();
            row_to_conversation(row, message_rows, presence_rows)
        })
        .collect()
}

async fn load_by_pair(
    conn: &mut AsyncPgConnection,
    pair: &ParticipantPair,
) -> Result<Option<Conversation>, ConversationPersistenceError> {
    let row: Option<ConversationRow> = conversations::table
        .filter(conversations::participant_low.eq(pair.low().as_uuid()))
        .filter(conversations::participant_high.eq(pair.high().as_uuid()))
        .select(ConversationRow::as_select())
        .first(conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

#[async_trait]
impl ConversationRepository for DieselConversationRepository {
    async fn create_if_absent(
        &self,
        candidate: &Conversation,
    ) -> Result<Conversation, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = ConversationRow {
            id: *candidate.id.as_uuid(),
            participant_low: *candidate.participants.low().as_uuid(),
            participant_high: *candidate.participants.high().as_uuid(),
            created_at: candidate.created_at,
            updated_at: candidate.updated_at,
        };
        let presence_rows: Vec<PresenceRow> = candidate
            .is_in_chat
            .iter()
            .map(|(username, in_chat)| PresenceRow {
                conversation_id: row.id,
                username: username.clone(),
                in_chat: *in_chat,
            })
            .collect();
        let message_rows: Vec<MessageRow> = candidate
            .messages
            .iter()
            .map(|message| message_row(&candidate.id, message))
            .collect();

        conn.transaction(|conn| {
            async move {
                let inserted = diesel::insert_into(conversations::table)
                    .values(&row)
                    .on_conflict((conversations::participant_low, conversations::participant_high))
                    .do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 0 {
                    return Ok(());
                }
                if !presence_rows.is_empty() {
                    diesel::insert_into(conversation_presence::table)
                        .values(&presence_rows)
                        .execute(conn)
                        .await?;
                }
                if !message_rows.is_empty() {
                    diesel::insert_into(messages::table)
                        .values(&message_rows)
                        .execute(conn)
                        .await?;
                }
                Ok::<_, diesel::result::Error>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)?;

        load_by_pair(&mut conn, &candidate.participants)
            .await?
            .ok_or_else(|| ConversationPersistenceError::query("conversation vanished after insert"))
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<ConversationRow> = conversations::table
            .find(*id.as_uuid())
            .select(ConversationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        match row {
            Some(row) => Ok(hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_participants(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Option<Conversation>, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        load_by_pair(&mut conn, pair).await
    }

    async fn list_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ConversationRow> = conversations::table
            .filter(
                conversations::participant_low
                    .eq(user.as_uuid())
                    .or(conversations::participant_high.eq(user.as_uuid())),
            )
            .order_by(conversations::created_at)
            .select(ConversationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        hydrate(&mut conn, rows).await
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: &Message,
    ) -> Result<bool, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = message_row(id, message);
        let conversation_id = *id.as_uuid();
        let touched_at = message.created_at;

        conn.transaction(|conn| {
            async move {
                let touched = diesel::update(conversations::table.find(conversation_id))
                    .set(conversations::updated_at.eq(touched_at))
                    .execute(conn)
                    .await?;
                if touched == 0 {
                    return Ok(false);
                }
                diesel::insert_into(messages::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(true)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn mark_read(
        &self,
        id: &ConversationId,
        message_ids: &[MessageId],
        now: DateTime<Utc>,
    ) -> Result<u64, ConversationPersistenceError> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = message_ids.iter().map(|id| *id.as_uuid()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let changed = diesel::update(
            messages::table
                .filter(messages::conversation_id.eq(id.as_uuid()))
                .filter(messages::id.eq_any(&ids))
                .filter(messages::read.eq(false)),
        )
        .set((messages::read.eq(true), messages::updated_at.eq(now)))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    async fn set_in_chat(
        &self,
        id: &ConversationId,
        username: &str,
        in_chat: bool,
    ) -> Result<bool, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = PresenceRow {
            conversation_id: *id.as_uuid(),
            username: username.to_owned(),
            in_chat,
        };
        let result = diesel::insert_into(conversation_presence::table)
            .values(&row)
            .on_conflict((
                conversation_presence::conversation_id,
                conversation_presence::username,
            ))
            .do_update()
            .set(conversation_presence::in_chat.eq(in_chat))
            .execute(&mut conn)
            .await;
        match result {
            Ok(rows) => Ok(rows > 0),
            Err(error) => match classify(error) {
                Failure::ForeignKeyViolation => Ok(false),
                Failure::Connection(message) => {
                    Err(ConversationPersistenceError::connection(message))
                }
                Failure::Query(message) => Err(ConversationPersistenceError::query(message)),
                Failure::UniqueViolation { .. } => {
                    Err(ConversationPersistenceError::query("unique constraint violated"))
                }
            },
        }
    }

    async fn clear_in_chat_for(
        &self,
        user: &UserId,
        username: &str,
    ) -> Result<u64, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let owned = conversations::table
            .filter(
                conversations::participant_low
                    .eq(user.as_uuid())
                    .or(conversations::participant_high.eq(user.as_uuid())),
            )
            .select(conversations::id);
        let cleared = diesel::update(
            conversation_presence::table
                .filter(conversation_presence::username.eq(username))
                .filter(conversation_presence::in_chat.eq(true))
                .filter(conversation_presence::conversation_id.eq_any(owned)),
        )
        .set(conversation_presence::in_chat.eq(false))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(u64::try_from(cleared).unwrap_or(u64::MAX))
    }

    async fn rename_participant(
        &self,
        user: &UserId,
        old: &str,
        new: &str,
    ) -> Result<u64, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let owned: Vec<Uuid> = conversations::table
            .filter(
                conversations::participant_low
                    .eq(user.as_uuid())
                    .or(conversations::participant_high.eq(user.as_uuid())),
            )
            .select(conversations::id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if owned.is_empty() {
            return Ok(0);
        }
        let (old, new) = (old.to_owned(), new.to_owned());

        let changed = conn
            .transaction(|conn| {
                async move {
                    let senders = diesel::update(
                        messages::table
                            .filter(messages::conversation_id.eq_any(&owned))
                            .filter(messages::sender.eq(&old)),
                    )
                    .set(messages::sender.eq(&new))
                    .execute(conn)
                    .await?;
                    let receivers = diesel::update(
                        messages::table
                            .filter(messages::conversation_id.eq_any(&owned))
                            .filter(messages::receiver.eq(&old)),
                    )
                    .set(messages::receiver.eq(&new))
                    .execute(conn)
                    .await?;
                    let presence = diesel::update(
                        conversation_presence::table
                            .filter(conversation_presence::conversation_id.eq_any(&owned))
                            .filter(conversation_presence::username.eq(&old)),
                    )
                    .set(conversation_presence::username.eq(&new))
                    .execute(conn)
                    .await?;
                    Ok::<_, diesel::result::Error>(senders + receivers + presence)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, ConversationPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::delete(conversations::table.find(*id.as_uuid()))
            .execute(&mut conn)
            .await
            .map(|rows| rows > 0)
            .map_err(map_diesel_error)
    }
}
