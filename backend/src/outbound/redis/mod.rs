//! Redis-backed adapters pooled through `bb8-redis`.
//!
//! The redis client is the one re-exported by `bb8-redis`, so the pool and
//! the commands always agree on the client version.

mod notification_log;

use std::time::Duration;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection, RunError};
use bb8_redis::redis::RedisError;

pub use notification_log::RedisNotificationLog;

/// Errors raised while building or using the Redis pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedisPoolError {
    #[error("failed to get redis connection from pool: {message}")]
    Checkout { message: String },
    #[error("failed to build redis pool: {message}")]
    Build { message: String },
}

impl RedisPoolError {
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

/// Settings for [`RedisPool`].
///
/// Defaults: 16 connections and a 5 second checkout timeout.
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    url: String,
    max_size: u32,
    connection_timeout: Duration,
}

impl RedisPoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_size: 16,
            connection_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Shared pool of multiplexed Redis connections.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Build the pool. Fails when the URL cannot be parsed. Connections are
    /// opened lazily, so an unreachable server surfaces on first checkout.
    pub fn new(config: RedisPoolConfig) -> Result<Self, RedisPoolError> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|err| RedisPoolError::build(err.to_string()))?;
        let inner = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build_unchecked(manager);
        Ok(Self { inner })
    }

    pub async fn get(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, RedisPoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| RedisPoolError::checkout(checkout_message(&err)))
    }
}

fn checkout_message(error: &RunError<RedisError>) -> String {
    match error {
        RunError::User(inner) => inner.to_string(),
        RunError::TimedOut => "timed out waiting for a redis connection".to_owned(),
    }
}

/// Whether a command failure means the server is unreachable rather than
/// the command being rejected.
pub(crate) fn is_connection_failure(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
        || error.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn config_defaults() {
        let config = RedisPoolConfig::new("redis://localhost:6379");
        assert_eq!(config.url(), "redis://localhost:6379");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[rstest]
    fn timed_out_checkout_has_a_readable_message() {
        let message = checkout_message(&RunError::TimedOut);
        assert!(message.contains("timed out"));
    }

    #[rstest]
    fn rejects_unparseable_urls() {
        let result = RedisPool::new(RedisPoolConfig::new("not a url"));
        assert!(matches!(result, Err(RedisPoolError::Build { .. })));
    }
}
