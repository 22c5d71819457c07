//! Entry point: load config, wire dependencies, and run the server.

use nearchat::auth::JwtSecret;
use nearchat::config::{Config, PresenceBackend};
use nearchat::db::{self, PgIdentityStore, PgPresenceStore};
use nearchat::repositories::{
    IdentityStore, MemoryIdentityStore, MemoryPresenceStore, PresenceStore, RedisRepository,
};
use nearchat::services::{BotPacing, MatchSettings};
use nearchat::{create_app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type Stores = (Arc<dyn PresenceStore>, Arc<dyn IdentityStore>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (presence, identity) = build_stores(&config).await?;
    let settings = MatchSettings {
        wait_attempts: config.match_wait_attempts,
        poll_interval: config.match_poll_interval,
    };
    let state = AppState::new(
        presence,
        identity,
        JwtSecret::new(config.jwt_secret.clone()),
        settings,
        BotPacing::default(),
    );
    let registry = state.registry.clone();
    let app = create_app(state);

    tracing::info!(
        addr = %config.server_addr,
        backend = ?config.presence_backend,
        "listening"
    );
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down, closing sockets");
            registry.shutdown().await;
        })
        .await?;
    Ok(())
}

async fn build_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.presence_backend {
        PresenceBackend::Postgres => {
            let pool = db::create_pool(&config.database_url).await?;
            Ok((
                Arc::new(PgPresenceStore::new(pool.clone())),
                Arc::new(PgIdentityStore::new(pool)),
            ))
        }
        PresenceBackend::Redis => {
            let pool = db::create_pool(&config.database_url).await?;
            let repo = RedisRepository::new(&config.redis_url)?;
            Ok((Arc::new(repo), Arc::new(PgIdentityStore::new(pool))))
        }
        PresenceBackend::Memory => {
            tracing::warn!("memory presence backend: state is lost on restart");
            Ok((
                Arc::new(MemoryPresenceStore::new()),
                Arc::new(MemoryIdentityStore::new()),
            ))
        }
    }
}
