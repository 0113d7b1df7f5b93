//! Port for password hashing.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised by password hashing adapters.
    pub enum PasswordHashError {
        /// Hashing or verification failed.
        Hash { message: String } => "password hashing failed: {message}",
    }
}

/// Hashes and verifies passwords. Adapters must not block the runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, password: &str) -> Result<String, PasswordHashError>;

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError>;
}

/// Reversible stand-in for tests that do not exercise hashing.
///
/// The "hash" is the password behind a fixed prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixturePasswordHasher;

const FIXTURE_PREFIX: &str = "fixture$";

#[async_trait]
impl PasswordHasher for FixturePasswordHasher {
    async fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        Ok(format!("{FIXTURE_PREFIX}{password}"))
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError> {
        Ok(hash.strip_prefix(FIXTURE_PREFIX) == Some(password))
    }
}
