//! Presence rows and the normalized shape used for proximity snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a connected user, taken from the bearer token.
pub type UserId = i64;

/// Reserved identity of the synthetic bot. Never has a row or a registry entry.
pub const BOT_PEER_ID: UserId = 0;

/// Matchmaking status stored on a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Searching,
    Chatting,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Searching => "searching",
            SessionStatus::Chatting => "chatting",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "searching" => Ok(SessionStatus::Searching),
            "chatting" => Ok(SessionStatus::Chatting),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// One row of the presence store. At most one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSession {
    pub user_id: UserId,
    /// Stored coordinates may be unreadable (null column, corrupt hash field).
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: SessionStatus,
    pub last_active: DateTime<Utc>,
}

impl LiveSession {
    pub fn new(user_id: UserId, lat: f64, lon: f64, status: SessionStatus) -> Self {
        Self {
            user_id,
            latitude: Some(lat),
            longitude: Some(lon),
            status,
            last_active: Utc::now(),
        }
    }
}

/// Conditional status transition: applies to every listed row or to none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    pub user_ids: Vec<UserId>,
    pub expected: SessionStatus,
}

impl StatusFilter {
    pub fn new(user_ids: impl Into<Vec<UserId>>, expected: SessionStatus) -> Self {
        Self {
            user_ids: user_ids.into(),
            expected,
        }
    }
}

/// Display attributes joined onto presence rows for the map view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayAttributes {
    pub name: Option<String>,
    pub category: Option<String>,
}

/// Normalized live user, the input of the geo filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUser {
    pub user_id: UserId,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub status: SessionStatus,
    pub name: Option<String>,
    pub category: Option<String>,
}

impl LiveUser {
    pub fn from_session(session: &LiveSession, attrs: DisplayAttributes) -> Self {
        Self {
            user_id: session.user_id,
            lat: session.latitude,
            lon: session.longitude,
            status: session.status,
            name: attrs.name,
            category: attrs.category,
        }
    }
}
