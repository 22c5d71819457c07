//! PostgreSQL stores: `active_sessions` for presence, `users` for display attributes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::warn;

use super::DbPool;
use crate::error::AppResult;
use crate::models::presence::{DisplayAttributes, LiveSession, SessionStatus, StatusFilter, UserId};
use crate::repositories::{IdentityStore, PresenceStore};

// ---- Presence ----

#[derive(Debug, FromRow)]
struct ActiveSessionRow {
    user_id: i64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    status: String,
    last_active: DateTime<Utc>,
}

impl ActiveSessionRow {
    fn into_session(self) -> Option<LiveSession> {
        match self.status.parse::<SessionStatus>() {
            Ok(status) => Some(LiveSession {
                user_id: self.user_id,
                latitude: self.latitude,
                longitude: self.longitude,
                status,
                last_active: self.last_active,
            }),
            Err(e) => {
                warn!(user_id = self.user_id, error = %e, "skipping presence row");
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct PgPresenceStore {
    pool: DbPool,
}

impl PgPresenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceStore for PgPresenceStore {
    async fn get_all(&self) -> AppResult<Vec<LiveSession>> {
        let rows = sqlx::query_as::<_, ActiveSessionRow>(
            "SELECT user_id, latitude, longitude, status, last_active FROM active_sessions",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(ActiveSessionRow::into_session).collect())
    }

    async fn get(&self, user_id: UserId) -> AppResult<Option<LiveSession>> {
        let row = sqlx::query_as::<_, ActiveSessionRow>(
            "SELECT user_id, latitude, longitude, status, last_active FROM active_sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(ActiveSessionRow::into_session))
    }

    async fn upsert(
        &self,
        user_id: UserId,
        lat: f64,
        lon: f64,
        status: SessionStatus,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO active_sessions (user_id, latitude, longitude, status, last_active)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                status = EXCLUDED.status,
                last_active = NOW()
            "#,
        )
        .bind(user_id)
        .bind(lat)
        .bind(lon)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
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
        let mut tx = self.pool.begin().await?;
        // Lock in id order so two claims over overlapping rows cannot deadlock.
        let locked: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM active_sessions
            WHERE user_id = ANY($1) AND status = $2
            ORDER BY user_id
            FOR UPDATE
            "#,
        )
        .bind(&filter.user_ids)
        .bind(filter.expected.as_str())
        .fetch_all(&mut *tx)
        .await?;

        if locked.len() != filter.user_ids.len() {
            tx.rollback().await?;
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE active_sessions SET status = $1, last_active = NOW()
            WHERE user_id = ANY($2) AND status = $3
            "#,
        )
        .bind(new_status.as_str())
        .bind(&filter.user_ids)
        .bind(filter.expected.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query("DELETE FROM active_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn searching_peers(&self, exclude: UserId) -> AppResult<Vec<UserId>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM active_sessions
            WHERE user_id <> $1 AND status = 'searching'
            ORDER BY last_active
            "#,
        )
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

// ---- Identity ----

#[derive(Debug, FromRow)]
struct DisplayRow {
    id: i64,
    username: Option<String>,
    avatar_type: Option<String>,
}

impl From<DisplayRow> for DisplayAttributes {
    fn from(row: DisplayRow) -> Self {
        DisplayAttributes {
            name: row.username,
            category: row.avatar_type,
        }
    }
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn display_attributes(&self, user_id: UserId) -> AppResult<DisplayAttributes> {
        let row = sqlx::query_as::<_, DisplayRow>(
            "SELECT id, username, avatar_type FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DisplayAttributes::from).unwrap_or_default())
    }

    async fn display_attributes_many(
        &self,
        user_ids: &[UserId],
    ) -> AppResult<HashMap<UserId, DisplayAttributes>> {
        let rows = sqlx::query_as::<_, DisplayRow>(
            "SELECT id, username, avatar_type FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut out: HashMap<UserId, DisplayAttributes> =
            rows.into_iter().map(|r| (r.id, r.into())).collect();
        for id in user_ids {
            out.entry(*id).or_default();
        }
        Ok(out)
    }
}
