//! Presence and identity store seams, plus the Redis and in-memory backends.
//! The PostgreSQL backends live in [`crate::db`].

pub mod memory;
pub mod redis_repo;

pub use memory::{MemoryIdentityStore, MemoryPresenceStore};
pub use redis_repo::RedisRepository;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::AppResult;
use crate::models::presence::{DisplayAttributes, LiveSession, SessionStatus, StatusFilter, UserId};

/// Durable record of who is live, where, and whether they are searching.
///
/// Shared by every connection task. Cross-user mutations must go through
/// [`PresenceStore::conditional_update`]; `upsert` is only for a user
/// refreshing their own row.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn get_all(&self) -> AppResult<Vec<LiveSession>>;

    async fn get(&self, user_id: UserId) -> AppResult<Option<LiveSession>>;

    /// Insert or replace the user's row and refresh `last_active`.
    async fn upsert(
        &self,
        user_id: UserId,
        lat: f64,
        lon: f64,
        status: SessionStatus,
    ) -> AppResult<()>;

    /// Move every row in `filter.user_ids` from `filter.expected` to `new_status`,
    /// but only if all of them are still in `filter.expected`. Returns the
    /// number of rows changed: either 0 or `filter.user_ids.len()`.
    async fn conditional_update(
        &self,
        filter: &StatusFilter,
        new_status: SessionStatus,
    ) -> AppResult<u64>;

    async fn delete(&self, user_id: UserId) -> AppResult<()>;

    /// Users other than `exclude` currently searching, oldest activity first.
    async fn searching_peers(&self, exclude: UserId) -> AppResult<Vec<UserId>> {
        let mut rows: Vec<LiveSession> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|s| s.user_id != exclude && s.status == SessionStatus::Searching)
            .collect();
        rows.sort_by_key(|s| s.last_active);
        Ok(rows.into_iter().map(|s| s.user_id).collect())
    }
}

/// Read-only view of account display data.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn display_attributes(&self, user_id: UserId) -> AppResult<DisplayAttributes>;

    async fn display_attributes_many(
        &self,
        user_ids: &[UserId],
    ) -> AppResult<HashMap<UserId, DisplayAttributes>> {
        let mut out = HashMap::with_capacity(user_ids.len());
        for &id in user_ids {
            out.insert(id, self.display_attributes(id).await?);
        }
        Ok(out)
    }
}
