//! `NotificationLog` backed by one Redis hash per recipient.
//!
//! Layout:
//! - `notifications:{recipient}` hashes the decimal id to the entry JSON.
//! - `notifications:{recipient}:seq` holds the last issued id. It is never
//!   deleted, so ids are not reused after the log is cleared.
//!
//! Append and mark-read run as Lua through `EVAL` so the duplicate check, the
//! id allocation and the write happen atomically on the server.

use async_trait::async_trait;
use bb8_redis::redis::{self, Cmd, RedisError};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::ports::{NotificationLog, NotificationLogError};
use crate::domain::{AppendOutcome, NewNotification, Notification, NotificationId, UserId};

use super::{RedisPool, RedisPoolError, is_connection_failure};

/// Returns the new id, or 0 when a matching entry already exists.
const APPEND_SCRIPT: &str = r"
local candidate = cjson.decode(ARGV[1])
if ARGV[2] == '1' then
  for _, raw in ipairs(redis.call('HVALS', KEYS[1])) do
    local entry = cjson.decode(raw)
    if entry['type'] == candidate['type'] and entry['from'] == candidate['from']
      and entry['to'] == candidate['to'] and entry['message'] == candidate['message'] then
      return 0
    end
  end
end
local id = redis.call('INCR', KEYS[2])
candidate['id'] = id
redis.call('HSET', KEYS[1], tostring(id), cjson.encode(candidate))
return id
";

/// Returns 1 when the entry existed.
const MARK_READ_SCRIPT: &str = r"
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if not raw then
  return 0
end
local entry = cjson.decode(raw)
entry['read'] = true
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(entry))
return 1
";

/// `EVAL` of `script` over `keys`. Arguments are appended by the caller.
fn eval(script: &str, keys: &[String]) -> Cmd {
    let mut cmd = redis::cmd("EVAL");
    cmd.arg(script).arg(keys.len()).arg(keys);
    cmd
}

fn log_key(recipient: &UserId) -> String {
    format!("notifications:{recipient}")
}

fn sequence_key(recipient: &UserId) -> String {
    format!("notifications:{recipient}:seq")
}

fn map_pool_error(error: RedisPoolError) -> NotificationLogError {
    match error {
        RedisPoolError::Checkout { message } | RedisPoolError::Build { message } => {
            NotificationLogError::connection(message)
        }
    }
}

fn map_redis_error(error: RedisError) -> NotificationLogError {
    debug!(%error, "redis command failed");
    if is_connection_failure(&error) {
        NotificationLogError::connection(error.to_string())
    } else {
        NotificationLogError::query(error.to_string())
    }
}

fn map_json_error(error: serde_json::Error) -> NotificationLogError {
    NotificationLogError::serialization(error.to_string())
}

/// Decode `HGETALL` output into entries ordered by id.
fn decode_entries(raw: Vec<(String, String)>) -> Result<Vec<Notification>, NotificationLogError> {
    let mut entries = raw
        .into_iter()
        .map(|(_, payload)| serde_json::from_str::<Notification>(&payload).map_err(map_json_error))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.id);
    Ok(entries)
}

#[derive(Clone)]
pub struct RedisNotificationLog {
    pool: RedisPool,
}

impl RedisNotificationLog {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn entries(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationLogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let raw: Vec<(String, String)> = redis::cmd("HGETALL")
            .arg(log_key(recipient))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        decode_entries(raw)
    }
}

#[async_trait]
impl NotificationLog for RedisNotificationLog {
    async fn append(
        &self,
        recipient: &UserId,
        notification: &NewNotification,
    ) -> Result<AppendOutcome, NotificationLogError> {
        let template = notification
            .clone()
            .into_notification(NotificationId::new(0));
        let payload = serde_json::to_string(&template).map_err(map_json_error)?;
        let dedup = if notification.kind.deduplicates() { "1" } else { "0" };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let id: u64 = eval(APPEND_SCRIPT, &[log_key(recipient), sequence_key(recipient)])
            .arg(payload)
            .arg(dedup)
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;

        if id == 0 {
            return Ok(AppendOutcome::Duplicate);
        }
        Ok(AppendOutcome::Appended(
            notification.clone().into_notification(NotificationId::new(id)),
        ))
    }

    async fn list(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationLogError> {
        self.entries(recipient).await
    }

    async fn mark_read(
        &self,
        recipient: &UserId,
        id: NotificationId,
    ) -> Result<bool, NotificationLogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let found: u64 = eval(MARK_READ_SCRIPT, &[log_key(recipient)])
            .arg(id.get())
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(found == 1)
    }

    async fn sweep(
        &self,
        recipient: &UserId,
        threshold_days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, NotificationLogError> {
        let expired: Vec<u64> = self
            .entries(recipient)
            .await?
            .into_iter()
            .filter(|entry| entry.is_sweepable(now, threshold_days))
            .map(|entry| entry.id.get())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        redis::cmd("HDEL")
            .arg(log_key(recipient))
            .arg(expired)
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(
        &self,
        recipient: &UserId,
        id: NotificationId,
    ) -> Result<bool, NotificationLogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let removed: u64 = redis::cmd("HDEL")
            .arg(log_key(recipient))
            .arg(id.get())
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn delete_all(&self, recipient: &UserId) -> Result<bool, NotificationLogError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let removed: u64 = redis::cmd("DEL")
            .arg(log_key(recipient))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }
}
