//! Session and authentication gate.
//!
//! Every inbound surface resolves its caller here before touching any other
//! service. A failed resolution is always `Unauthorized`.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info};

use crate::domain::conversation_service::ConversationService;
use crate::domain::ports::{PasswordHasher, UserRepository};
use crate::domain::service_support::{map_hash_error, map_user_error, require_user};
use crate::domain::{
    Email, Error, LoginCredentials, SessionToken, User, UserId, UserUpdate, generate_reset_token,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const NOT_AUTHENTICATED: &str = "login required";

/// Evidence of identity presented by a request or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityClaim {
    /// User id stored in the cookie session.
    Session(UserId),
    /// Session token from a bearer header or the upgrade query string.
    Token(SessionToken),
}

impl IdentityClaim {
    /// Parse a raw token. Malformed tokens yield `None`.
    #[must_use]
    pub fn token(raw: &str) -> Option<Self> {
        SessionToken::parse(raw).map(Self::Token)
    }
}

#[derive(Clone)]
pub struct AuthGate {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    conversations: ConversationService,
    clock: Arc<dyn Clock>,
}

impl AuthGate {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        conversations: ConversationService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            hasher,
            conversations,
            clock,
        }
    }

    /// Resolve the first claim that names a live user.
    ///
    /// Claims are tried in order so a stale cookie does not hide a valid
    /// bearer token.
    pub async fn resolve(&self, claims: &[IdentityClaim]) -> Result<User, Error> {
        for claim in claims {
            let found = match claim {
                IdentityClaim::Session(id) => self.users.find_by_id(id).await,
                IdentityClaim::Token(token) => self.users.find_by_session_token(token).await,
            }
            .map_err(map_user_error)?;
            if let Some(user) = found {
                return Ok(user);
            }
            debug!(?claim, "identity claim did not resolve");
        }
        Err(Error::unauthorized(NOT_AUTHENTICATED))
    }

    /// Verify credentials and rotate the session token.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(SessionToken, User), Error> {
        let user = self
            .users
            .find_by_email(credentials.email())
            .await
            .map_err(map_user_error)?
            .ok_or_else(|| Error::unauthorized(INVALID_CREDENTIALS))?;
        let verified = self
            .hasher
            .verify(credentials.password(), &user.password_hash)
            .await
            .map_err(map_hash_error)?;
        if !verified {
            return Err(Error::unauthorized(INVALID_CREDENTIALS));
        }

        let token = SessionToken::generate();
        let updated = self
            .users
            .apply(&user.id, &UserUpdate::SetSessionToken(token), self.clock.utc())
            .await
            .map_err(map_user_error)?;
        let updated = require_user(updated, &user.id)?;
        info!(user_id = %updated.id, "user logged in");
        Ok((token, updated))
    }

    pub async fn logout(&self, user_id: &UserId) -> Result<(), Error> {
        self.users
            .apply(user_id, &UserUpdate::ClearSessionToken, self.clock.utc())
            .await
            .map_err(map_user_error)?;
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    /// Store a fresh reset token for the account and return it.
    pub async fn issue_reset_token(&self, email: &Email) -> Result<String, Error> {
        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(map_user_error)?
            .ok_or_else(|| Error::not_found(format!("No user with email: {email}")))?;
        let token = generate_reset_token();
        self.users
            .apply(
                &user.id,
                &UserUpdate::SetResetToken(token.clone()),
                self.clock.utc(),
            )
            .await
            .map_err(map_user_error)?;
        info!(user_id = %user.id, "password reset token issued");
        Ok(token)
    }

    /// Replace the password when `reset_token` matches the stored one.
    ///
    /// The reset token is consumed and any active session token is revoked.
    pub async fn reset_password(
        &self,
        email: &Email,
        reset_token: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        if new_password.is_empty() {
            return Err(Error::invalid_request("password must not be empty"));
        }
        let invalid = || Error::invalid_request("Invalid or expired reset token");
        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(map_user_error)?
            .ok_or_else(invalid)?;
        if user.reset_token.as_deref() != Some(reset_token.trim()) {
            return Err(invalid());
        }

        let hash = self
            .hasher
            .hash(new_password)
            .await
            .map_err(map_hash_error)?;
        let now = self.clock.utc();
        for update in [UserUpdate::SetPasswordHash(hash), UserUpdate::ClearSessionToken] {
            self.users
                .apply(&user.id, &update, now)
                .await
                .map_err(map_user_error)?;
        }
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    /// Delete the conversation between two users once neither lists the
    /// other as a friend. Returns whether a conversation was deleted.
    pub async fn confirm_and_delete(&self, user_id: &UserId, other_id: &UserId) -> Result<bool, Error> {
        let user = self.users.find_by_id(user_id).await.map_err(map_user_error)?;
        let user = require_user(user, user_id)?;
        let other = self
            .users
            .find_by_id(other_id)
            .await
            .map_err(map_user_error)?;
        let still_linked = user.is_friend_of(other_id)
            || other.is_some_and(|other| other.is_friend_of(user_id));
        if still_linked {
            debug!(user_id = %user_id, other_id = %other_id, "conversation kept: still friends");
            return Ok(false);
        }

        let Some(conversation) = self.conversations.find_between(user_id, other_id).await? else {
            return Ok(false);
        };
        self.conversations.delete(&conversation.id).await
    }
}

#[cfg(test)]
#[path = "auth_gate_tests.rs"]
mod tests;
