//! Integration tests: probes, end-to-end matchmaking over the service layer,
//! and the SQL/Redis presence stores.
//!
//! Run with `cargo test`. Store tests need live backends and are skipped unless set:
//! - `TEST_DATABASE_URL` (Postgres with `active_sessions` and `users` tables)
//! - `TEST_REDIS_URL` (e.g. redis://127.0.0.1:6379)

use axum::body::Body;
use axum::http::{Request, StatusCode};
use nearchat::auth::JwtSecret;
use nearchat::db::{self, PgPresenceStore};
use nearchat::handlers::disconnect;
use nearchat::models::{SessionStatus, StatusFilter, BOT_PEER_ID};
use nearchat::repositories::{
    MemoryIdentityStore, MemoryPresenceStore, PresenceStore, RedisRepository,
};
use nearchat::services::{BotPacing, Liveness, MatchSettings};
use nearchat::{create_app, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use tower::util::ServiceExt;

fn memory_state(presence: MemoryPresenceStore) -> AppState {
    AppState::new(
        Arc::new(presence),
        Arc::new(MemoryIdentityStore::new()),
        JwtSecret::new("test-jwt-secret".to_string()),
        MatchSettings {
            wait_attempts: 3,
            poll_interval: Duration::from_millis(10),
        },
        BotPacing::instant(),
    )
}

fn frames(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|f| serde_json::from_str(&f).unwrap())
        .collect()
}

#[tokio::test]
async fn health_reports_open_sockets() {
    let state = memory_state(MemoryPresenceStore::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    state.registry.register(11, tx).await;
    let app = create_app(state);

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(json.get("connections").and_then(|v| v.as_u64()), Some(1));
}

#[tokio::test]
async fn ready_with_memory_store() {
    let app = create_app(memory_state(MemoryPresenceStore::new()));
    let req = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn socket_route_requires_upgrade() {
    let app = create_app(memory_state(MemoryPresenceStore::new()));
    let req = Request::builder()
        .uri("/ws/some-token")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert!(res.status().is_client_error());
}

#[tokio::test]
async fn two_searchers_meet_and_relay_signaling() {
    let presence = MemoryPresenceStore::new();
    let state = memory_state(presence.clone());
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    state.registry.register(1, tx_a).await;
    state.registry.register(2, tx_b).await;
    let (_ga, la) = Liveness::pair();
    let (_gb, lb) = Liveness::pair();

    let (ra, rb) = (state.router.clone(), state.router.clone());
    tokio::join!(
        async move {
            ra.dispatch(1, r#"{"type":"search_nearest","lat":59.33,"lon":18.06}"#, &la)
                .await
        },
        async move {
            rb.dispatch(2, r#"{"type":"search_nearest","lat":59.34,"lon":18.07}"#, &lb)
                .await
        },
    );

    let a = frames(&mut rx_a);
    let b = frames(&mut rx_b);
    let match_a: Vec<_> = a.iter().filter(|f| f["type"] == "match_found").collect();
    let match_b: Vec<_> = b.iter().filter(|f| f["type"] == "match_found").collect();
    assert_eq!(match_a.len(), 1);
    assert_eq!(match_a[0]["peer_id"], 2);
    assert_eq!(match_b.len(), 1);
    assert_eq!(match_b[0]["peer_id"], 1);
    for f in a.iter().chain(b.iter()) {
        assert_ne!(f["type"], "bot_typing");
        assert_ne!(f["type"], "chat_msg");
    }

    // The last snapshot each side got shows both markers.
    let last_a = a.iter().rev().find(|f| f["type"] == "active_users").unwrap();
    assert_eq!(last_a["users"].as_array().unwrap().len(), 2);

    let (_g, live) = Liveness::pair();
    let offer = r#"{"type":"offer","peer_id":2,"sdp":"v=0"}"#;
    state.router.dispatch(1, offer, &live).await;
    assert_eq!(rx_b.try_recv().unwrap(), offer);

    for id in [1, 2] {
        let row = presence.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Chatting);
    }
}

#[tokio::test]
async fn disconnect_removes_marker_from_neighbours() {
    let presence = MemoryPresenceStore::new();
    let state = memory_state(presence.clone());
    presence.upsert(1, 0.0, 0.0, SessionStatus::Chatting).await.unwrap();
    presence.upsert(2, 0.01, 0.0, SessionStatus::Chatting).await.unwrap();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, _rx_b) = mpsc::unbounded_channel();
    state.registry.register(1, tx_a).await;
    let leaving = state.registry.register(2, tx_b).await;

    assert!(disconnect(&state, 2, leaving).await);
    assert!(presence.get(2).await.unwrap().is_none());

    let snapshot = frames(&mut rx_a).pop().unwrap();
    let ids: Vec<i64> = snapshot["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["user_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1]);
}

async fn exercise_presence_store(store: &dyn PresenceStore, base: i64) {
    let (a, b, c) = (base, base + 1, base + 2);
    for id in [a, b, c] {
        let _ = store.delete(id).await;
    }
    assert_ok!(store.upsert(a, 1.0, 2.0, SessionStatus::Searching).await);
    assert_ok!(store.upsert(b, 1.0, 2.0, SessionStatus::Searching).await);
    assert_ok!(store.upsert(c, 1.0, 2.0, SessionStatus::Chatting).await);

    let peers = store.searching_peers(a).await.unwrap();
    assert!(peers.contains(&b));
    assert!(!peers.contains(&c));

    let blocked = StatusFilter::new(vec![a, c], SessionStatus::Searching);
    assert_eq!(
        store.conditional_update(&blocked, SessionStatus::Chatting).await.unwrap(),
        0
    );
    assert_eq!(store.get(a).await.unwrap().unwrap().status, SessionStatus::Searching);

    let claim = StatusFilter::new(vec![a, b], SessionStatus::Searching);
    assert_eq!(
        store.conditional_update(&claim, SessionStatus::Chatting).await.unwrap(),
        2
    );
    assert_eq!(
        store.conditional_update(&claim, SessionStatus::Chatting).await.unwrap(),
        0
    );

    for id in [a, b, c] {
        assert_ok!(store.delete(id).await);
        assert!(store.get(id).await.unwrap().is_none());
    }
    assert!(store.get(BOT_PEER_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn postgres_presence_store_claims_atomically() {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("Skip integration test: set TEST_DATABASE_URL");
            return;
        }
    };
    let pool = match db::create_pool(&database_url).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Skip integration test: {}", e);
            return;
        }
    };
    exercise_presence_store(&PgPresenceStore::new(pool), 900_001).await;
}

#[tokio::test]
async fn redis_presence_store_claims_atomically() {
    let redis_url = match std::env::var("TEST_REDIS_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("Skip integration test: set TEST_REDIS_URL");
            return;
        }
    };
    let repo = match RedisRepository::new(&redis_url) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Skip integration test: {}", e);
            return;
        }
    };
    if repo.connection().await.is_err() {
        eprintln!("Skip integration test: redis unreachable");
        return;
    }
    exercise_presence_store(&repo, 910_001).await;
}
