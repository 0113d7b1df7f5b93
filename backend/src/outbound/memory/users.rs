//! In-memory `UserRepository`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::ports::{UserPersistenceError, UserRepository};
use crate::domain::{
    Email, FriendSummary, SessionToken, TrackGrant, TrackGrantee, User, UserId, UserUpdate,
    Username,
};

/// Users held in a map guarded by one lock, so uniqueness checks and writes
/// are serialised.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_user<T>(&self, id: &UserId, change: impl FnOnce(&mut User) -> T) -> Option<T> {
        self.users.lock().await.get_mut(id).map(change)
    }
}

fn find_duplicate(
    users: &HashMap<UserId, User>,
    candidate: &User,
) -> Option<UserPersistenceError> {
    users
        .values()
        .filter(|existing| existing.id != candidate.id)
        .find_map(|existing| {
            if existing.username == candidate.username {
                Some(UserPersistenceError::duplicate("username"))
            } else if existing.email == candidate.email {
                Some(UserPersistenceError::duplicate("email"))
            } else {
                None
            }
        })
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, user: &User) -> Result<(), UserPersistenceError> {
        let mut users = self.users.lock().await;
        if let Some(error) = find_duplicate(&users, user) {
            return Err(error);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError> {
        Ok(self.users.lock().await.get(id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, UserPersistenceError> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.username == *username)
            .cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, UserPersistenceError> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.email == *email)
            .cloned())
    }

    async fn find_by_session_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<User>, UserPersistenceError> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.session_token.as_ref() == Some(token))
            .cloned())
    }

    async fn apply(
        &self,
        id: &UserId,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserPersistenceError> {
        let mut users = self.users.lock().await;
        let Some(current) = users.get(id) else {
            return Ok(None);
        };
        let mut updated = current.clone();
        updated.apply(update, now);
        if let Some(error) = find_duplicate(&users, &updated) {
            return Err(error);
        }
        users.insert(*id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: &UserId) -> Result<bool, UserPersistenceError> {
        Ok(self.users.lock().await.remove(id).is_some())
    }

    async fn put_friend(
        &self,
        owner: &UserId,
        friend: &FriendSummary,
    ) -> Result<bool, UserPersistenceError> {
        let stored = self
            .with_user(owner, |user| {
                user.friends.insert(friend.id, friend.clone());
            })
            .await;
        Ok(stored.is_some())
    }

    async fn remove_friend(
        &self,
        owner: &UserId,
        friend: &UserId,
    ) -> Result<bool, UserPersistenceError> {
        Ok(self
            .with_user(owner, |user| user.friends.remove(friend).is_some())
            .await
            .unwrap_or(false))
    }

    async fn put_allowed_track(
        &self,
        owner: &UserId,
        granter: &UserId,
        grant: &TrackGrant,
    ) -> Result<bool, UserPersistenceError> {
        let stored = self
            .with_user(owner, |user| {
                user.allowed_tracks.insert(*granter, grant.clone());
            })
            .await;
        Ok(stored.is_some())
    }

    async fn remove_allowed_track(
        &self,
        owner: &UserId,
        granter: &UserId,
    ) -> Result<bool, UserPersistenceError> {
        Ok(self
            .with_user(owner, |user| user.allowed_tracks.remove(granter).is_some())
            .await
            .unwrap_or(false))
    }

    async fn put_tracking_me(
        &self,
        owner: &UserId,
        grantee: &UserId,
        entry: &TrackGrantee,
    ) -> Result<bool, UserPersistenceError> {
        let stored = self
            .with_user(owner, |user| {
                user.tracking_me.insert(*grantee, entry.clone());
            })
            .await;
        Ok(stored.is_some())
    }

    async fn remove_tracking_me(
        &self,
        owner: &UserId,
        grantee: &UserId,
    ) -> Result<bool, UserPersistenceError> {
        Ok(self
            .with_user(owner, |user| user.tracking_me.remove(grantee).is_some())
            .await
            .unwrap_or(false))
    }

    async fn search(
        &self,
        query: &str,
        exclude: &UserId,
        limit: usize,
    ) -> Result<Vec<User>, UserPersistenceError> {
        let needle = query.to_lowercase();
        let users = self.users.lock().await;
        let mut matches: Vec<User> = users
            .values()
            .filter(|user| user.id != *exclude)
            .filter(|user| user.username.as_str().to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        matches.truncate(limit);
        Ok(matches)
    }
}
