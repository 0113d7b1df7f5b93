//! In-memory `NotificationLog`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::ports::{NotificationLog, NotificationLogError};
use crate::domain::{AppendOutcome, NewNotification, Notification, NotificationId, UserId};

#[derive(Default)]
struct RecipientLog {
    /// Last issued id. Survives deletion of entries and of the whole log.
    sequence: u64,
    entries: BTreeMap<NotificationId, Notification>,
}

#[derive(Default)]
pub struct MemoryNotificationLog {
    logs: Mutex<HashMap<UserId, RecipientLog>>,
}

impl MemoryNotificationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationLog for MemoryNotificationLog {
    async fn append(
        &self,
        recipient: &UserId,
        notification: &NewNotification,
    ) -> Result<AppendOutcome, NotificationLogError> {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(*recipient).or_default();
        if log
            .entries
            .values()
            .any(|existing| existing.duplicates(notification))
        {
            return Ok(AppendOutcome::Duplicate);
        }
        log.sequence += 1;
        let id = NotificationId::new(log.sequence);
        let stored = notification.clone().into_notification(id);
        log.entries.insert(id, stored.clone());
        Ok(AppendOutcome::Appended(stored))
    }

    async fn list(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationLogError> {
        Ok(self
            .logs
            .lock()
            .await
            .get(recipient)
            .map(|log| log.entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn mark_read(
        &self,
        recipient: &UserId,
        id: NotificationId,
    ) -> Result<bool, NotificationLogError> {
        let mut logs = self.logs.lock().await;
        let Some(entry) = logs
            .get_mut(recipient)
            .and_then(|log| log.entries.get_mut(&id))
        else {
            return Ok(false);
        };
        entry.read = true;
        Ok(true)
    }

    async fn sweep(
        &self,
        recipient: &UserId,
        threshold_days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, NotificationLogError> {
        let mut logs = self.logs.lock().await;
        let Some(log) = logs.get_mut(recipient) else {
            return Ok(0);
        };
        let before = log.entries.len();
        log.entries
            .retain(|_, entry| !entry.is_sweepable(now, threshold_days));
        Ok(u64::try_from(before - log.entries.len()).unwrap_or(u64::MAX))
    }

    async fn delete(
        &self,
        recipient: &UserId,
        id: NotificationId,
    ) -> Result<bool, NotificationLogError> {
        Ok(self
            .logs
            .lock()
            .await
            .get_mut(recipient)
            .is_some_and(|log| log.entries.remove(&id).is_some()))
    }

    async fn delete_all(&self, recipient: &UserId) -> Result<bool, NotificationLogError> {
        let mut logs = self.logs.lock().await;
        let Some(log) = logs.get_mut(recipient) else {
            return Ok(false);
        };
        let had_entries = !log.entries.is_empty();
        log.entries.clear();
        Ok(had_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Avatar, NotificationKind, Username};
    use chrono::Duration;
    use rstest::{fixture, rstest};

    fn pending(kind: NotificationKind, date: DateTime<Utc>) -> NewNotification {
        NewNotification {
            from: Username::new("alice").expect("username"),
            to: Username::new("bob").expect("username"),
            message: "alice sent you a friend request".to_owned(),
            kind,
            avatar: Avatar::default(),
            date,
        }
    }

    #[fixture]
    fn log() -> MemoryNotificationLog {
        MemoryNotificationLog::new()
    }

    #[rstest]
    #[tokio::test]
    async fn identical_friend_requests_are_stored_once(log: MemoryNotificationLog) {
        let bob = UserId::random();
        let request = pending(NotificationKind::FriendRequest, Utc::now());
        let first = log.append(&bob, &request).await.expect("append");
        let second = log.append(&bob, &request).await.expect("append");

        assert!(matches!(first, AppendOutcome::Appended(_)));
        assert_eq!(second, AppendOutcome::Duplicate);
        assert_eq!(log.list(&bob).await.expect("list").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn identical_general_notifications_are_both_kept(log: MemoryNotificationLog) {
        let bob = UserId::random();
        let general = pending(NotificationKind::General, Utc::now());
        log.append(&bob, &general).await.expect("append");
        log.append(&bob, &general).await.expect("append");

        let ids: Vec<u64> = log
            .list(&bob)
            .await
            .expect("list")
            .iter()
            .map(|entry| entry.id.get())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[rstest]
    #[tokio::test]
    async fn ids_are_not_reused_after_deletion(log: MemoryNotificationLog) {
        let bob = UserId::random();
        let general = pending(NotificationKind::General, Utc::now());
        log.append(&bob, &general).await.expect("append");
        log.append(&bob, &general).await.expect("append");
        assert!(log.delete(&bob, NotificationId::new(2)).await.expect("delete"));
        assert!(log.delete_all(&bob).await.expect("delete all"));

        let AppendOutcome::Appended(next) = log.append(&bob, &general).await.expect("append")
        else {
            panic!("general notifications always append");
        };
        assert_eq!(next.id, NotificationId::new(3));
    }

    #[rstest]
    #[tokio::test]
    async fn sweep_removes_only_old_read_entries(log: MemoryNotificationLog) {
        let bob = UserId::random();
        let now = Utc::now();
        let old = now - Duration::days(40);
        let recent = now - Duration::days(5);
        for date in [old, old, recent] {
            log.append(&bob, &pending(NotificationKind::General, date))
                .await
                .expect("append");
        }
        log.mark_read(&bob, NotificationId::new(1)).await.expect("mark");
        log.mark_read(&bob, NotificationId::new(3)).await.expect("mark");

        let removed = log.sweep(&bob, 30, now).await.expect("sweep");

        assert_eq!(removed, 1);
        let remaining: Vec<u64> = log
            .list(&bob)
            .await
            .expect("list")
            .iter()
            .map(|entry| entry.id.get())
            .collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[rstest]
    #[tokio::test]
    async fn mark_read_reports_missing_entries(log: MemoryNotificationLog) {
        let found = log
            .mark_read(&UserId::random(), NotificationId::new(9))
            .await
            .expect("mark");
        assert!(!found);
    }
}
