//! Adapter selection for the running server.
//!
//! PostgreSQL and Redis back the stores when their URLs are configured;
//! otherwise the in-memory adapters are used and data lives only as long as
//! the process.

use std::sync::Arc;

use mockable::DefaultClock;
use tracing::{info, warn};

use beacon::domain::ports::{
    AvatarStore, ConversationRepository, NotificationLog, PasswordHasher, UserRepository,
};
use beacon::outbound::avatars::FsAvatarStore;
use beacon::outbound::memory::{
    MemoryConversationRepository, MemoryNotificationLog, MemoryUserRepository,
};
use beacon::outbound::password::BcryptPasswordHasher;
use beacon::outbound::persistence::{
    DbPool, DieselConversationRepository, DieselUserRepository, MigrationError, PoolConfig,
    PoolError, run_pending_migrations,
};
use beacon::outbound::redis::{RedisNotificationLog, RedisPool, RedisPoolConfig, RedisPoolError};
use beacon::wiring::Adapters;

use super::ServerConfig;

/// Failure to prepare a configured backing store.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Migrations(#[from] MigrationError),
    #[error(transparent)]
    Database(#[from] PoolError),
    #[error(transparent)]
    Redis(#[from] RedisPoolError),
}

type DocumentStores = (Arc<dyn UserRepository>, Arc<dyn ConversationRepository>);

async fn build_document_stores(config: &ServerConfig) -> Result<DocumentStores, AdapterError> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("no database configured; users and conversations are kept in memory");
        return Ok((
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemoryConversationRepository::new()),
        ));
    };
    let applied = run_pending_migrations(url).await?;
    info!(applied, "database migrations applied");
    let pool = DbPool::new(PoolConfig::new(url)).await?;
    Ok((
        Arc::new(DieselUserRepository::new(pool.clone())),
        Arc::new(DieselConversationRepository::new(pool)),
    ))
}

fn build_notification_log(config: &ServerConfig) -> Result<Arc<dyn NotificationLog>, AdapterError> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let pool = RedisPool::new(RedisPoolConfig::new(url))?;
            Ok(Arc::new(RedisNotificationLog::new(pool)))
        }
        None => {
            warn!("no Redis configured; notifications are kept in memory");
            Ok(Arc::new(MemoryNotificationLog::new()))
        }
    }
}

/// Pick the adapters named by `config`.
pub(crate) async fn build_adapters(config: &ServerConfig) -> Result<Adapters, AdapterError> {
    let (users, conversations) = build_document_stores(config).await?;
    let notifications = build_notification_log(config)?;
    let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptPasswordHasher::default());
    let avatars: Arc<dyn AvatarStore> = Arc::new(FsAvatarStore::new(config.avatar_dir.clone()));
    Ok(Adapters {
        users,
        conversations,
        notifications,
        hasher,
        avatars,
        clock: Arc::new(DefaultClock),
    })
}
