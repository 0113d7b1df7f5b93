//! Port abstraction for user persistence adapters and their errors.
//!
//! Relationship maps are mutated entry by entry so that a write to one
//! user's document never clobbers a concurrent write to another entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Email, FriendSummary, SessionToken, TrackGrant, TrackGrantee, User, UserId, UserUpdate,
    Username,
};

use super::define_port_error;

define_port_error! {
    /// Persistence errors raised by user repository adapters.
    pub enum UserPersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } => "user repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "user repository query failed: {message}",
        /// A unique attribute is already taken by another user.
        Duplicate { field: String } => "a user with this {field} already exists",
    }
}

/// Storage for user documents and their relationship maps.
///
/// Mutating operations return `false` when the owning user does not exist or,
/// for removals, when the entry was already absent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user, enforcing unique username and email.
    async fn insert(&self, user: &User) -> Result<(), UserPersistenceError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError>;

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, UserPersistenceError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, UserPersistenceError>;

    async fn find_by_session_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<User>, UserPersistenceError>;

    /// Apply one update and return the updated user, or `None` when absent.
    async fn apply(
        &self,
        id: &UserId,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserPersistenceError>;

    /// Delete a user document. Returns whether it existed.
    async fn delete(&self, id: &UserId) -> Result<bool, UserPersistenceError>;

    /// Insert or replace `friend` inside `owner.friends`.
    async fn put_friend(
        &self,
        owner: &UserId,
        friend: &FriendSummary,
    ) -> Result<bool, UserPersistenceError>;

    async fn remove_friend(
        &self,
        owner: &UserId,
        friend: &UserId,
    ) -> Result<bool, UserPersistenceError>;

    /// Insert or replace `granter` inside `owner.allowed_tracks`.
    async fn put_allowed_track(
        &self,
        owner: &UserId,
        granter: &UserId,
        grant: &TrackGrant,
    ) -> Result<bool, UserPersistenceError>;

    async fn remove_allowed_track(
        &self,
        owner: &UserId,
        granter: &UserId,
    ) -> Result<bool, UserPersistenceError>;

    /// Insert or replace `grantee` inside `owner.tracking_me`.
    async fn put_tracking_me(
        &self,
        owner: &UserId,
        grantee: &UserId,
        entry: &TrackGrantee,
    ) -> Result<bool, UserPersistenceError>;

    async fn remove_tracking_me(
        &self,
        owner: &UserId,
        grantee: &UserId,
    ) -> Result<bool, UserPersistenceError>;

    /// Case-insensitive substring search on usernames, ordered by username.
    async fn search(
        &self,
        query: &str,
        exclude: &UserId,
        limit: usize,
    ) -> Result<Vec<User>, UserPersistenceError>;
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn duplicate_error_names_the_field() {
        let error = UserPersistenceError::duplicate("email");
        assert_eq!(error.to_string(), "a user with this email already exists");
    }
}
