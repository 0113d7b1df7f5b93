//! Filesystem `AvatarStore`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::Avatar;
use crate::domain::ports::{AvatarStore, AvatarStoreError};

/// Avatars stored as files below `root`, addressed by their relative path.
#[derive(Debug, Clone)]
pub struct FsAvatarStore {
    root: PathBuf,
}

impl FsAvatarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `avatar` below the root. Paths that would escape it resolve
    /// to `None`.
    fn resolve(&self, avatar: &Avatar) -> Option<PathBuf> {
        let relative = Path::new(avatar.as_str());
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl AvatarStore for FsAvatarStore {
    async fn remove(&self, avatar: &Avatar) -> Result<(), AvatarStoreError> {
        if avatar.is_default() {
            return Ok(());
        }
        let Some(path) = self.resolve(avatar) else {
            debug!(avatar = avatar.as_str(), "ignoring avatar outside the store");
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AvatarStoreError::io(err.to_string())),
        }
    }
}
