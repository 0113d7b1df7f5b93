//! Port for the per-recipient notification log.
//!
//! Each recipient owns an ordered log. Identifiers come from a per-recipient
//! counter that only ever increases, so ids are never reused after deletion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AppendOutcome, NewNotification, Notification, NotificationId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification log adapters.
    pub enum NotificationLogError {
        /// Store connection could not be established.
        Connection { message: String } => "notification store connection failed: {message}",
        /// Command failed during execution.
        Query { message: String } => "notification store command failed: {message}",
        /// A stored entry could not be encoded or decoded.
        Serialization { message: String } =>
            "notification payload serialization failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Append an entry atomically.
    ///
    /// Non-general kinds are de-duplicated on `(from, to, message, kind)`:
    /// a match yields [`AppendOutcome::Duplicate`] and stores nothing.
    async fn append(
        &self,
        recipient: &UserId,
        notification: &NewNotification,
    ) -> Result<AppendOutcome, NotificationLogError>;

    /// Every entry in the recipient's log, ordered by id ascending.
    async fn list(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationLogError>;

    /// Mark one entry as read. Returns whether it existed.
    async fn mark_read(
        &self,
        recipient: &UserId,
        id: NotificationId,
    ) -> Result<bool, NotificationLogError>;

    /// Delete read entries whose age exceeds `threshold_days` whole days.
    /// Returns how many were removed.
    async fn sweep(
        &self,
        recipient: &UserId,
        threshold_days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, NotificationLogError>;

    /// Delete one entry. Returns whether it existed.
    async fn delete(
        &self,
        recipient: &UserId,
        id: NotificationId,
    ) -> Result<bool, NotificationLogError>;

    /// Drop the recipient's whole log. Returns whether anything was stored.
    async fn delete_all(&self, recipient: &UserId) -> Result<bool, NotificationLogError>;
}
