//! Redis-backed presence store: one hash per live user plus a set of live ids.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::PresenceStore;
use crate::error::{AppError, AppResult};
use crate::models::presence::{LiveSession, SessionStatus, StatusFilter, UserId};

const LIVE_SET_KEY: &str = "nearchat:live";
const SESSION_PREFIX: &str = "nearchat:session:";

/// Flip every KEYS[i] from ARGV[1] to ARGV[2] only when all of them hold ARGV[1].
const CONDITIONAL_STATUS_SCRIPT: &str = r#"
for _, key in ipairs(KEYS) do
  if redis.call('HGET', key, 'status') ~= ARGV[1] then
    return 0
  end
end
for _, key in ipairs(KEYS) do
  redis.call('HSET', key, 'status', ARGV[2], 'last_active', ARGV[3])
end
return #KEYS
"#;

fn session_key(user_id: UserId) -> String {
    format!("{}{}", SESSION_PREFIX, user_id)
}

#[derive(Clone)]
pub struct RedisRepository {
    client: Arc<redis::Client>,
    conditional_status: Arc<redis::Script>,
}

impl RedisRepository {
    /// Create repository from Redis URL.
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
            conditional_status: Arc::new(redis::Script::new(CONDITIONAL_STATUS_SCRIPT)),
        })
    }

    /// Get a multiplexed connection for commands.
    pub async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    async fn read_session(
        conn: &mut redis::aio::MultiplexedConnection,
        user_id: UserId,
    ) -> AppResult<Option<LiveSession>> {
        let fields: HashMap<String, String> = conn.hgetall(session_key(user_id)).await?;
        Ok(session_from_fields(user_id, &fields))
    }
}

/// Decode a session hash. Missing or corrupt coordinates become `None`;
/// a hash without a readable status is treated as absent.
fn session_from_fields(user_id: UserId, fields: &HashMap<String, String>) -> Option<LiveSession> {
    let status: SessionStatus = fields.get("status")?.parse().ok()?;
    let coord = |name: &str| fields.get(name).and_then(|v| v.parse::<f64>().ok());
    let last_active = fields
        .get("last_active")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);
    Some(LiveSession {
        user_id,
        latitude: coord("lat"),
        longitude: coord("lon"),
        status,
        last_active,
    })
}

#[async_trait]
impl PresenceStore for RedisRepository {
    async fn get_all(&self) -> AppResult<Vec<LiveSession>> {
        let mut conn = self.connection().await?;
        let ids: Vec<UserId> = conn.smembers(LIVE_SET_KEY).await?;
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = Self::read_session(&mut conn, id).await? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn get(&self, user_id: UserId) -> AppResult<Option<LiveSession>> {
        let mut conn = self.connection().await?;
        Self::read_session(&mut conn, user_id).await
    }

    async fn upsert(
        &self,
        user_id: UserId,
        lat: f64,
        lon: f64,
        status: SessionStatus,
    ) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let fields = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("status", status.as_str().to_string()),
            ("last_active", Utc::now().timestamp_millis().to_string()),
        ];
        redis::pipe()
            .atomic()
            .sadd(LIVE_SET_KEY, user_id)
            .ignore()
            .hset_multiple(session_key(user_id), &fields)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        debug!(user_id, status = %status, "presence upserted");
        Ok(())
    }

    async fn conditional_update(
        &self,
        filter: &StatusFilter,
        new_status: SessionStatus,
    ) -> AppResult<u64> {
        if filter.user_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let mut invocation = self.conditional_status.prepare_invoke();
        for &id in &filter.user_ids {
            invocation.key(session_key(id));
        }
        invocation
            .arg(filter.expected.as_str())
            .arg(new_status.as_str())
            .arg(Utc::now().timestamp_millis());
        let changed: u64 = invocation.invoke_async(&mut conn).await?;
        Ok(changed)
    }

    async fn delete(&self, user_id: UserId) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .srem(LIVE_SET_KEY, user_id)
            .ignore()
            .del(session_key(user_id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
