//! Authentication primitives: credentials, registrations, and session tokens.
//!
//! Keep inbound payload parsing outside the domain by exposing constructors
//! that validate string inputs before a handler talks to a port or service.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::user::{Email, UserValidationError, Username};

/// Length of the short-lived password reset token.
pub const RESET_TOKEN_LEN: usize = 8;

/// Domain error returned when login or registration payload values are invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginValidationError {
    /// Email was missing or malformed.
    InvalidEmail,
    /// Password was blank.
    EmptyPassword,
    /// Registration carried an invalid profile field.
    Profile(UserValidationError),
}

impl fmt::Display for LoginValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEmail => write!(f, "email address is not valid"),
            Self::EmptyPassword => write!(f, "password must not be empty"),
            Self::Profile(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LoginValidationError {}

impl From<UserValidationError> for LoginValidationError {
    fn from(value: UserValidationError) -> Self {
        match value {
            UserValidationError::InvalidEmail => Self::InvalidEmail,
            other => Self::Profile(other),
        }
    }
}

fn require_password(password: &str) -> Result<Zeroizing<String>, LoginValidationError> {
    if password.is_empty() {
        return Err(LoginValidationError::EmptyPassword);
    }
    Ok(Zeroizing::new(password.to_owned()))
}

/// Validated login credentials used by the auth gate.
///
/// ## Invariants
/// - `email` is normalised to lowercase.
/// - `password` is required to be non-empty but retains caller-provided
///   whitespace to avoid surprising credential comparisons.
///
/// # Examples
/// ```
/// use beacon::domain::LoginCredentials;
///
/// let creds = LoginCredentials::try_from_parts("Bob@Example.com", "password").unwrap();
/// assert_eq!(creds.email().as_str(), "bob@example.com");
/// assert_eq!(creds.password(), "password");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    email: Email,
    password: Zeroizing<String>,
}

impl LoginCredentials {
    /// Construct credentials from raw email/password inputs.
    pub fn try_from_parts(email: &str, password: &str) -> Result<Self, LoginValidationError> {
        let email = Email::new(email).map_err(|_| LoginValidationError::InvalidEmail)?;
        let password = require_password(password)?;
        Ok(Self { email, password })
    }

    /// Normalised email used for the user lookup.
    pub fn email(&self) -> &Email {
        &self.email
    }

    /// Password string provided by the caller.
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

/// Validated sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    username: Username,
    full_name: String,
    email: Email,
    password: Zeroizing<String>,
}

impl Registration {
    /// Validate raw sign-up fields.
    pub fn try_from_parts(
        full_name: &str,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Self, LoginValidationError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(UserValidationError::EmptyFullName.into());
        }
        Ok(Self {
            username: Username::new(username.trim())?,
            full_name: full_name.to_owned(),
            email: Email::new(email)?,
            password: require_password(password)?,
        })
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn full_name(&self) -> &str {
        self.full_name.as_str()
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

/// Opaque bearer token identifying the single active session of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
pub struct SessionToken(Uuid);

impl SessionToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an already-parsed UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a presented token, returning `None` for anything malformed.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Generate a short password reset token.
#[must_use]
pub fn generate_reset_token() -> String {
    let mut token = Uuid::new_v4().to_string();
    token.truncate(RESET_TOKEN_LEN);
    token
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "pw", LoginValidationError::InvalidEmail)]
    #[case("not-an-email", "pw", LoginValidationError::InvalidEmail)]
    #[case("user@example.com", "", LoginValidationError::EmptyPassword)]
    fn invalid_credentials(
        #[case] email: &str,
        #[case] password: &str,
        #[case] expected: LoginValidationError,
    ) {
        let err = LoginCredentials::try_from_parts(email, password)
            .expect_err("invalid inputs must fail");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn valid_credentials_keep_password_whitespace() {
        let creds = LoginCredentials::try_from_parts(" alice@example.com ", " secret ")
            .expect("valid inputs should succeed");
        assert_eq!(creds.email().as_str(), "alice@example.com");
        assert_eq!(creds.password(), " secret ");
    }

    #[rstest]
    #[case("", "bob", "bob@example.com", "pw", LoginValidationError::Profile(UserValidationError::EmptyFullName))]
    #[case("Bob", "b!", "bob@example.com", "pw", LoginValidationError::Profile(UserValidationError::UsernameTooShort { min: 3 }))]
    #[case("Bob", "bob", "bob", "pw", LoginValidationError::InvalidEmail)]
    #[case("Bob", "bob", "bob@example.com", "", LoginValidationError::EmptyPassword)]
    fn invalid_registrations(
        #[case] full_name: &str,
        #[case] username: &str,
        #[case] email: &str,
        #[case] password: &str,
        #[case] expected: LoginValidationError,
    ) {
        let err = Registration::try_from_parts(full_name, username, email, password)
            .expect_err("invalid registration must fail");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn reset_tokens_are_short_and_distinct() {
        let first = generate_reset_token();
        let second = generate_reset_token();
        assert_eq!(first.len(), RESET_TOKEN_LEN);
        assert_ne!(first, second);
    }

    #[rstest]
    fn session_tokens_parse_round_trip() {
        let token = SessionToken::generate();
        assert_eq!(SessionToken::parse(&token.to_string()), Some(token));
        assert_eq!(SessionToken::parse("garbage"), None);
    }
}
