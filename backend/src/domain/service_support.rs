//! Internal helpers shared by the domain services.

use crate::domain::ports::{
    AvatarStoreError, ConversationPersistenceError, NotificationLogError, PasswordHashError,
    UserPersistenceError,
};
use crate::domain::{Error, User, UserId, Username};

pub(crate) fn map_user_error(error: UserPersistenceError) -> Error {
    match error {
        UserPersistenceError::Connection { message } => {
            Error::service_unavailable(format!("user repository unavailable: {message}"))
        }
        UserPersistenceError::Query { message } => {
            Error::internal(format!("user repository error: {message}"))
        }
        UserPersistenceError::Duplicate { field } => {
            Error::conflict(format!("{field} is already taken"))
                .with_details(serde_json::json!({ "field": field, "code": "duplicate" }))
        }
    }
}

pub(crate) fn map_conversation_error(error: ConversationPersistenceError) -> Error {
    match error {
        ConversationPersistenceError::Connection { message } => {
            Error::service_unavailable(format!("conversation repository unavailable: {message}"))
        }
        ConversationPersistenceError::Query { message } => {
            Error::internal(format!("conversation repository error: {message}"))
        }
    }
}

pub(crate) fn map_notification_error(error: NotificationLogError) -> Error {
    match error {
        NotificationLogError::Connection { message } => {
            Error::service_unavailable(format!("notification store unavailable: {message}"))
        }
        NotificationLogError::Query { message } => {
            Error::internal(format!("notification store error: {message}"))
        }
        NotificationLogError::Serialization { message } => {
            Error::internal(format!("notification payload invalid: {message}"))
        }
    }
}

pub(crate) fn map_hash_error(error: PasswordHashError) -> Error {
    Error::internal(error.to_string())
}

pub(crate) fn map_avatar_error(error: AvatarStoreError) -> Error {
    Error::internal(error.to_string())
}

/// Parse a client-supplied username, treating malformed values as unknown.
pub(crate) fn parse_username(raw: &str) -> Option<Username> {
    Username::new(raw.trim()).ok()
}

pub(crate) fn user_not_found(id: &UserId) -> Error {
    Error::not_found(format!("user {id} not found"))
}

pub(crate) fn require_user(user: Option<User>, id: &UserId) -> Result<User, Error> {
    user.ok_or_else(|| user_not_found(id))
}
