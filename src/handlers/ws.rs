//! WebSocket handler: token check, per-connection reader/writer tasks, sequential frame loop.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::http::AppState;
use crate::models::presence::UserId;
use crate::services::Liveness;

const BEARER_PREFIX: &str = "Bearer ";

/// GET /ws/:token
pub async fn ws_token_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, ws, Some(token))
}

/// GET /ws with `?token=` or `Authorization: Bearer`.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, ws, bearer_token(&headers, &params))
}

/// Token from the query string, else from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap, params: &HashMap<String, String>) -> Option<String> {
    params.get("token").cloned().or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX))
            .map(|s| s.trim().to_string())
    })
}

fn authorize(state: &AppState, token: Option<&str>) -> AppResult<UserId> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Auth("missing token".to_string()))?;
    state.jwt_secret().validate(token)
}

/// Sockets with a bad credential are accepted only to be closed with 1008,
/// so browsers see a policy-violation close rather than a failed handshake.
fn upgrade(state: AppState, ws: WebSocketUpgrade, token: Option<String>) -> Response {
    let identity = authorize(&state, token.as_deref());
    ws.on_upgrade(move |socket| async move {
        match identity {
            Ok(user_id) => handle_socket(state, socket, user_id).await,
            Err(e) => reject(socket, e).await,
        }
    })
}

async fn reject(mut socket: WebSocket, reason: AppError) {
    warn!(error = %reason, "ws rejected");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "policy violation".into(),
        })))
        .await;
}

async fn handle_socket(state: AppState, socket: WebSocket, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection_id = state.registry().register(user_id, tx).await;
    info!(user_id, connection_id = %connection_id, "ws connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Reading runs apart from processing so a close is noticed while a search waits.
    let (guard, liveness) = Liveness::pair();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let read_task = tokio::spawn(async move {
        let _guard = guard;
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if frame_tx.send(text).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    state.broadcaster.broadcast().await;

    while let Some(text) = frame_rx.recv().await {
        state.router.dispatch(user_id, &text, &liveness).await;
    }

    disconnect(&state, user_id, connection_id).await;

    read_task.abort();
    send_task.abort();
    info!(user_id, connection_id = %connection_id, "ws disconnected");
}

/// Tear down `connection_id` for `user_id`. The presence row is dropped and
/// neighbours refreshed only while this connection still owns the registry
/// entry; a newer socket for the same user keeps both. Returns whether it did.
pub async fn disconnect(state: &AppState, user_id: UserId, connection_id: Uuid) -> bool {
    if !state.registry().release(user_id, connection_id).await {
        info!(user_id, connection_id = %connection_id, "stale socket closed, newer one kept");
        return false;
    }
    if let Err(e) = state.presence.delete(user_id).await {
        warn!(user_id, error = %e, "failed to drop presence row");
    }
    state.broadcaster.broadcast().await;
    true
}
