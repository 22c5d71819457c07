//! Session registry: user id -> outbound queue of the socket currently serving that user.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::event::ServerMessage;
use crate::models::presence::UserId;

/// Outbound half of a socket's writer queue. Each item is one text frame.
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: Uuid,
    tx: Outbound,
}

/// In-process map of live sockets. At most one handle per user; registering
/// again replaces the older handle. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    connections: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` for `user_id`, replacing any previous socket. Returns the
    /// id of the new handle, used later with [`SessionRegistry::release`].
    pub async fn register(&self, user_id: UserId, tx: Outbound) -> Uuid {
        let connection_id = Uuid::new_v4();
        let previous = self
            .connections
            .write()
            .await
            .insert(user_id, ConnectionHandle { connection_id, tx });
        if let Some(old) = previous {
            debug!(user_id, old = %old.connection_id, new = %connection_id, "socket replaced");
        }
        connection_id
    }

    pub async fn unregister(&self, user_id: UserId) {
        self.connections.write().await.remove(&user_id);
    }

    /// Remove the entry only if it still belongs to `connection_id`. Returns
    /// whether it did; `false` means a newer socket took over the user.
    pub async fn release(&self, user_id: UserId, connection_id: Uuid) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get(&user_id) {
            Some(handle) if handle.connection_id == connection_id => {
                conns.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Best-effort delivery of one frame. A closed channel unregisters the
    /// user before this returns, so later broadcasts skip it.
    pub async fn send(&self, user_id: UserId, payload: String) -> bool {
        let handle = match self.connections.read().await.get(&user_id) {
            Some(h) => h.clone(),
            None => return false,
        };
        if handle.tx.send(payload).is_ok() {
            return true;
        }
        warn!(user_id, connection_id = %handle.connection_id, "delivery failed, dropping socket");
        self.release(user_id, handle.connection_id).await;
        false
    }

    pub async fn send_event(&self, user_id: UserId, event: &ServerMessage) -> bool {
        match serde_json::to_string(event) {
            Ok(payload) => self.send(user_id, payload).await,
            Err(e) => {
                warn!(user_id, error = %e, "failed to serialize event");
                false
            }
        }
    }

    pub async fn user_ids(&self) -> Vec<UserId> {
        self.connections.read().await.keys().copied().collect()
    }

    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Drop every handle; each writer task sees its queue close and ends.
    pub async fn shutdown(&self) {
        let mut conns = self.connections.write().await;
        debug!(count = conns.len(), "closing all sockets");
        conns.clear();
    }
}

/// Observes whether a socket is still open. Closed once the paired
/// [`LivenessGuard`] is dropped (the reader task owns it).
#[derive(Clone)]
pub struct Liveness {
    rx: watch::Receiver<()>,
}

pub struct LivenessGuard {
    _tx: watch::Sender<()>,
}

impl Liveness {
    pub fn pair() -> (LivenessGuard, Liveness) {
        let (tx, rx) = watch::channel(());
        (LivenessGuard { _tx: tx }, Liveness { rx })
    }

    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Resolves when the guard is dropped.
    pub async fn closed(&self) {
        let mut rx = self.rx.clone();
        while rx.changed().await.is_ok() {}
    }
}
