//! Port for uploaded avatar files.

use async_trait::async_trait;

use crate::domain::Avatar;

use super::define_port_error;

define_port_error! {
    /// Errors raised by avatar store adapters.
    pub enum AvatarStoreError {
        /// Filesystem or object store operation failed.
        Io { message: String } => "avatar store operation failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Remove a custom avatar. Missing files are not an error, and the shared
    /// default avatar is never removed.
    async fn remove(&self, avatar: &Avatar) -> Result<(), AvatarStoreError>;
}

/// No-op store for deployments without uploads.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureAvatarStore;

#[async_trait]
impl AvatarStore for FixtureAvatarStore {
    async fn remove(&self, _avatar: &Avatar) -> Result<(), AvatarStoreError> {
        Ok(())
    }
}
