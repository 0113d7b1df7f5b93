//! Pairwise conversations and the messages they own.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::user::{UserId, Username};

/// Stable conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
pub struct ConversationId(Uuid);

impl ConversationId {
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse an identifier supplied by a client.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message identifier, unique within its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
pub struct MessageId(Uuid);

impl MessageId {
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unordered pair of distinct participants, stored as `(low, high)`.
///
/// # Examples
/// ```
/// use beacon::domain::{ParticipantPair, UserId};
///
/// let a = UserId::random();
/// let b = UserId::random();
/// assert_eq!(ParticipantPair::new(a, b), ParticipantPair::new(b, a));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Normalise two participants. Returns `None` when both ids are equal.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    #[must_use]
    pub fn low(&self) -> UserId {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> UserId {
        self.high
    }

    #[must_use]
    pub fn contains(&self, id: &UserId) -> bool {
        self.low == *id || self.high == *id
    }

    /// The participant that is not `id`, if `id` belongs to the pair.
    #[must_use]
    pub fn other(&self, id: &UserId) -> Option<UserId> {
        if self.low == *id {
            Some(self.high)
        } else if self.high == *id {
            Some(self.low)
        } else {
            None
        }
    }
}

/// Kind of message payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ContentType {
    #[default]
    Text,
    Image,
}

impl ContentType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Image => "Image",
        }
    }

    /// Parse the persisted representation, defaulting to text.
    #[must_use]
    pub fn from_stored(raw: &str) -> Self {
        match raw {
            "Image" => Self::Image,
            _ => Self::Text,
        }
    }
}

/// Chat message owned by a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: MessageId,
    pub sender: Username,
    pub receiver: Username,
    pub content: String,
    pub content_type: ContentType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build an unread message with a fresh identifier.
    #[must_use]
    pub fn new(
        sender: Username,
        receiver: Username,
        content: String,
        content_type: ContentType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::random(),
            sender,
            receiver,
            content,
            content_type,
            read: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Conversation between exactly two users.
///
/// ## Invariants
/// - At most one conversation exists for each [`ParticipantPair`].
/// - `messages` is in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: ParticipantPair,
    pub messages: Vec<Message>,
    pub is_in_chat: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start an empty conversation with both presence flags cleared.
    #[must_use]
    pub fn start(
        participants: ParticipantPair,
        usernames: [&Username; 2],
        now: DateTime<Utc>,
    ) -> Self {
        let is_in_chat = usernames
            .into_iter()
            .map(|name| (name.as_str().to_owned(), false))
            .collect();
        Self {
            id: ConversationId::random(),
            participants,
            messages: Vec::new(),
            is_in_chat,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `username` is currently viewing this conversation.
    #[must_use]
    pub fn is_in_chat(&self, username: &str) -> bool {
        self.is_in_chat.get(username).copied().unwrap_or(false)
    }

    /// Whether an unread message addressed to `username` exists.
    #[must_use]
    pub fn has_unread_for(&self, username: &str) -> bool {
        self.messages
            .iter()
            .any(|message| !message.read && message.receiver.as_str() == username)
    }

    /// Carry a participant's rename into embedded usernames and the presence
    /// map. Returns how many entries changed.
    pub fn rename_participant(&mut self, old: &str, new: &Username) -> u64 {
        let mut changed = 0;
        for message in &mut self.messages {
            for name in [&mut message.sender, &mut message.receiver] {
                if name.as_str() == old {
                    *name = new.clone();
                    changed += 1;
                }
            }
        }
        if let Some(flag) = self.is_in_chat.remove(old) {
            self.is_in_chat.insert(new.as_str().to_owned(), flag);
            changed += 1;
        }
        changed
    }
}
