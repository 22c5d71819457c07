//! Process-local stores. Used with `PRESENCE_BACKEND=memory` and throughout the tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::{IdentityStore, PresenceStore};
use crate::error::AppResult;
use crate::models::presence::{DisplayAttributes, LiveSession, SessionStatus, StatusFilter, UserId};

#[derive(Clone, Default)]
pub struct MemoryPresenceStore {
    rows: Arc<Mutex<HashMap<UserId, LiveSession>>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn get_all(&self) -> AppResult<Vec<LiveSession>> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn get(&self, user_id: UserId) -> AppResult<Option<LiveSession>> {
        Ok(self.rows.lock().await.get(&user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: UserId,
        lat: f64,
        lon: f64,
        status: SessionStatus,
    ) -> AppResult<()> {
        self.rows
            .lock()
            .await
            .insert(user_id, LiveSession::new(user_id, lat, lon, status));
        Ok(())
    }

    async fn conditional_update(
        &self,
        filter: &StatusFilter,
        new_status: SessionStatus,
    ) -> AppResult<u64> {
        let mut rows = self.rows.lock().await;
        let all_expected = !filter.user_ids.is_empty()
            && filter.user_ids.iter().all(|id| {
                rows.get(id)
                    .map(|s| s.status == filter.expected)
                    .unwrap_or(false)
            });
        if !all_expected {
            return Ok(0);
        }
        let now = Utc::now();
        let mut changed = 0;
        for id in &filter.user_ids {
            if let Some(row) = rows.get_mut(id) {
                row.status = new_status;
                row.last_active = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, user_id: UserId) -> AppResult<()> {
        self.rows.lock().await.remove(&user_id);
        Ok(())
    }
}

/// Fixed table of display attributes; unknown ids are anonymous.
#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    users: Arc<RwLock<HashMap<UserId, DisplayAttributes>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: UserId, name: &str, category: &str) {
        self.users.write().await.insert(
            user_id,
            DisplayAttributes {
                name: Some(name.to_string()),
                category: Some(category.to_string()),
            },
        );
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn display_attributes(&self, user_id: UserId) -> AppResult<DisplayAttributes> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_keeps_one_row_per_user() {
        let store = MemoryPresenceStore::new();
        store.upsert(1, 10.0, 10.0, SessionStatus::Searching).await.unwrap();
        store.upsert(1, 11.0, 12.0, SessionStatus::Searching).await.unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].latitude, Some(11.0));
        assert_eq!(all[0].longitude, Some(12.0));
    }

    #[tokio::test]
    async fn conditional_update_is_all_or_nothing() {
        let store = MemoryPresenceStore::new();
        store.upsert(1, 0.0, 0.0, SessionStatus::Searching).await.unwrap();
        store.upsert(2, 0.0, 0.0, SessionStatus::Chatting).await.unwrap();

        let filter = StatusFilter::new(vec![1, 2], SessionStatus::Searching);
        let changed = store
            .conditional_update(&filter, SessionStatus::Chatting)
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(
            store.get(1).await.unwrap().unwrap().status,
            SessionStatus::Searching
        );
    }

    #[tokio::test]
    async fn conditional_update_misses_absent_rows() {
        let store = MemoryPresenceStore::new();
        store.upsert(1, 0.0, 0.0, SessionStatus::Searching).await.unwrap();
        let filter = StatusFilter::new(vec![1, 99], SessionStatus::Searching);
        assert_eq!(
            store.conditional_update(&filter, SessionStatus::Chatting).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn second_claim_on_same_rows_changes_nothing() {
        let store = MemoryPresenceStore::new();
        store.upsert(1, 0.0, 0.0, SessionStatus::Searching).await.unwrap();
        store.upsert(2, 0.0, 0.0, SessionStatus::Searching).await.unwrap();
        let filter = StatusFilter::new(vec![1, 2], SessionStatus::Searching);
        assert_eq!(
            store.conditional_update(&filter, SessionStatus::Chatting).await.unwrap(),
            2
        );
        assert_eq!(
            store.conditional_update(&filter, SessionStatus::Chatting).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn searching_peers_excludes_self_and_chatting() {
        let store = MemoryPresenceStore::new();
        store.upsert(1, 0.0, 0.0, SessionStatus::Searching).await.unwrap();
        store.upsert(2, 0.0, 0.0, SessionStatus::Chatting).await.unwrap();
        store.upsert(3, 0.0, 0.0, SessionStatus::Searching).await.unwrap();
        assert_eq!(store.searching_peers(1).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn identity_defaults_to_anonymous() {
        let ids = MemoryIdentityStore::new();
        ids.insert(4, "kim", "girl").await;
        let many = ids.display_attributes_many(&[4, 5]).await.unwrap();
        assert_eq!(many[&4].name.as_deref(), Some("kim"));
        assert_eq!(many[&5], DisplayAttributes::default());
    }
}
