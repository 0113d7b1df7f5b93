//! Notification domain service.
//!
//! Listings filter the recipient's full log. The log is small and already
//! ordered, so no adapter-side filtering is required.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info};

use crate::domain::ports::NotificationLog;
use crate::domain::service_support::map_notification_error;
use crate::domain::{
    AppendOutcome, Error, NewNotification, Notification, NotificationId, NotificationKind, User,
    UserId,
};

/// Read notifications older than this many days are swept by default.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Threshold applied by the sweep that runs when a connection opens.
pub const CONNECT_SWEEP_DAYS: u32 = 15;

#[derive(Clone)]
pub struct NotificationService {
    log: Arc<dyn NotificationLog>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(log: Arc<dyn NotificationLog>, clock: Arc<dyn Clock>) -> Self {
        Self { log, clock }
    }

    /// Append a notification from `sender` to `recipient`.
    ///
    /// The sender's current avatar is copied into the entry.
    pub async fn notify(
        &self,
        sender: &User,
        recipient: &User,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Result<AppendOutcome, Error> {
        let pending = NewNotification {
            from: sender.username.clone(),
            to: recipient.username.clone(),
            message: message.into(),
            kind,
            avatar: sender.avatar.clone(),
            date: self.clock.utc(),
        };
        let outcome = self
            .log
            .append(&recipient.id, &pending)
            .await
            .map_err(map_notification_error)?;
        match &outcome {
            AppendOutcome::Appended(stored) => debug!(
                recipient = %recipient.id,
                notification_id = %stored.id,
                kind = stored.kind.as_str(),
                "notification appended"
            ),
            AppendOutcome::Duplicate => debug!(
                recipient = %recipient.id,
                kind = kind.as_str(),
                "duplicate notification ignored"
            ),
        }
        Ok(outcome)
    }

    /// Append a general notification. These are never de-duplicated.
    pub async fn notify_general(
        &self,
        sender: &User,
        recipient: &User,
        message: impl Into<String>,
    ) -> Result<Notification, Error> {
        match self
            .notify(sender, recipient, message, NotificationKind::General)
            .await?
        {
            AppendOutcome::Appended(stored) => Ok(stored),
            AppendOutcome::Duplicate => Err(Error::internal(
                "general notification reported as duplicate",
            )),
        }
    }

    /// Record a friend request, rejecting a repeat of a pending one.
    pub async fn send_friend_request(
        &self,
        sender: &User,
        recipient: &User,
    ) -> Result<Notification, Error> {
        let message = format!("{} sent you a friend request", sender.username);
        match self
            .notify(sender, recipient, message, NotificationKind::FriendRequest)
            .await?
        {
            AppendOutcome::Appended(stored) => {
                info!(from = %sender.id, to = %recipient.id, "friend request sent");
                Ok(stored)
            }
            AppendOutcome::Duplicate => {
                Err(Error::conflict("You already sent a friend request"))
            }
        }
    }

    pub async fn list(&self, recipient: &UserId) -> Result<Vec<Notification>, Error> {
        self.log
            .list(recipient)
            .await
            .map_err(map_notification_error)
    }

    async fn list_where(
        &self,
        recipient: &UserId,
        keep: impl Fn(&Notification) -> bool,
    ) -> Result<Vec<Notification>, Error> {
        Ok(self
            .list(recipient)
            .await?
            .into_iter()
            .filter(|entry| keep(entry))
            .collect())
    }

    pub async fn list_unread(&self, recipient: &UserId) -> Result<Vec<Notification>, Error> {
        self.list_where(recipient, |entry| !entry.read).await
    }

    pub async fn list_read(&self, recipient: &UserId) -> Result<Vec<Notification>, Error> {
        self.list_where(recipient, |entry| entry.read).await
    }

    pub async fn list_friend_requests(
        &self,
        recipient: &UserId,
    ) -> Result<Vec<Notification>, Error> {
        self.list_where(recipient, |entry| {
            entry.kind == NotificationKind::FriendRequest
        })
        .await
    }

    /// Everything that is not a friend request.
    pub async fn list_general(&self, recipient: &UserId) -> Result<Vec<Notification>, Error> {
        self.list_where(recipient, |entry| {
            entry.kind != NotificationKind::FriendRequest
        })
        .await
    }

    pub async fn has_unread(&self, recipient: &UserId) -> Result<bool, Error> {
        Ok(self.list(recipient).await?.iter().any(|entry| !entry.read))
    }

    /// Flip the read flag. Returns whether the entry existed.
    pub async fn mark_read(&self, recipient: &UserId, id: NotificationId) -> Result<bool, Error> {
        self.log
            .mark_read(recipient, id)
            .await
            .map_err(map_notification_error)
    }

    pub async fn delete(&self, recipient: &UserId, id: NotificationId) -> Result<bool, Error> {
        self.log
            .delete(recipient, id)
            .await
            .map_err(map_notification_error)
    }

    pub async fn delete_all(&self, recipient: &UserId) -> Result<bool, Error> {
        self.log
            .delete_all(recipient)
            .await
            .map_err(map_notification_error)
    }

    /// Remove read entries older than `threshold_days`. Unread entries stay.
    pub async fn sweep(&self, recipient: &UserId, threshold_days: u32) -> Result<u64, Error> {
        let removed = self
            .log
            .sweep(recipient, threshold_days, self.clock.utc())
            .await
            .map_err(map_notification_error)?;
        if removed > 0 {
            info!(recipient = %recipient, removed, threshold_days, "notifications swept");
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "notification_service_tests.rs"]
mod tests;
