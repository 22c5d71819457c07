//! Anonymous proximity chat engine.
//!
//! Tracks who is connected and where, pairs searching users with a
//! conditional-write claim on the presence store, falls back to a scripted
//! bot after a bounded wait, pushes each user a map of live users within
//! 25 km, and relays call-signaling frames between paired peers.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::{MatchmakingService, SessionRegistry};

use axum::routing::get;
use handlers::http;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the router (socket endpoints and probes). Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/ws/:token", get(handlers::ws_token_handler))
        .route("/health", get(http::health))
        .route("/ready", get(http::ready))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
