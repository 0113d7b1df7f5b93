//! Per-recipient notification entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::{Avatar, Username};

/// Per-recipient identifier. Allocated from a counter and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[schema(value_type = u64, example = 7)]
pub struct NotificationId(u64);

impl NotificationId {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum NotificationKind {
    #[serde(rename = "friend request")]
    FriendRequest,
    #[serde(rename = "general")]
    General,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friend request",
            Self::General => "general",
        }
    }

    /// General notifications are never de-duplicated.
    #[must_use]
    pub fn deduplicates(&self) -> bool {
        !matches!(self, Self::General)
    }
}

/// Stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: NotificationId,
    pub from: Username,
    pub to: Username,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub date: DateTime<Utc>,
    pub avatar: Avatar,
}

impl Notification {
    /// Whether the entry qualifies for removal by a sweep at `now`.
    ///
    /// Only read entries strictly older than `threshold_days` whole days are
    /// swept.
    #[must_use]
    pub fn is_sweepable(&self, now: DateTime<Utc>, threshold_days: u32) -> bool {
        self.read && now.signed_duration_since(self.date).num_days() > i64::from(threshold_days)
    }

    /// Whether `candidate` would duplicate this entry.
    #[must_use]
    pub fn duplicates(&self, candidate: &NewNotification) -> bool {
        candidate.kind.deduplicates()
            && self.kind == candidate.kind
            && self.from == candidate.from
            && self.to == candidate.to
            && self.message == candidate.message
    }
}

/// Notification awaiting an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub from: Username,
    pub to: Username,
    pub message: String,
    pub kind: NotificationKind,
    pub avatar: Avatar,
    pub date: DateTime<Utc>,
}

impl NewNotification {
    /// Assign an identifier, producing the stored unread entry.
    #[must_use]
    pub fn into_notification(self, id: NotificationId) -> Notification {
        Notification {
            id,
            from: self.from,
            to: self.to,
            message: self.message,
            kind: self.kind,
            read: false,
            date: self.date,
            avatar: self.avatar,
        }
    }
}

/// Result of appending to a notification log.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(Notification),
    Duplicate,
}
