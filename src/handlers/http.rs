//! Shared application state and the health/readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use std::sync::Arc;

use crate::auth::JwtSecret;
use crate::error::AppError;
use crate::models::presence::BOT_PEER_ID;
use crate::repositories::{IdentityStore, PresenceStore};
use crate::services::{
    BotPacing, BotResponder, MatchSettings, MatchmakingService, ProximityBroadcaster, RelayRouter,
    SessionRegistry,
};

/// Shared application state for HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub presence: Arc<dyn PresenceStore>,
    pub broadcaster: ProximityBroadcaster,
    pub router: RelayRouter,
    pub jwt_secret: JwtSecret,
}

impl AppState {
    /// Wire every service around one registry and one pair of stores.
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        identity: Arc<dyn IdentityStore>,
        jwt_secret: JwtSecret,
        settings: MatchSettings,
        pacing: BotPacing,
    ) -> Self {
        let registry = SessionRegistry::new();
        let broadcaster = ProximityBroadcaster::new(presence.clone(), identity, registry.clone());
        let matchmaking = MatchmakingService::new(
            presence.clone(),
            registry.clone(),
            broadcaster.clone(),
            settings,
        );
        let bot = BotResponder::new(registry.clone(), pacing);
        let router = RelayRouter::new(registry.clone(), matchmaking, bot);
        Self {
            registry,
            presence,
            broadcaster,
            router,
            jwt_secret,
        }
    }

    pub fn jwt_secret(&self) -> &JwtSecret {
        &self.jwt_secret
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

/// GET /health with the number of open sockets.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let connections = state.registry().len().await;
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "nearchat", "connections": connections })),
    )
}

/// GET /ready fails with 503 while the presence store is unreachable.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    // The bot id never has a row, so this is a cheap round trip.
    state.presence.get(BOT_PEER_ID).await?;
    Ok(Json(json!({ "status": "ready" })))
}
