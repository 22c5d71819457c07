//! Proximity broadcaster: pushes each connected user the live users around them.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::geo::{nearby, PROXIMITY_RADIUS_KM};
use super::registry::SessionRegistry;
use crate::error::AppResult;
use crate::models::event::{NearbyUser, ServerMessage};
use crate::models::presence::{LiveSession, LiveUser, UserId};
use crate::repositories::{IdentityStore, PresenceStore};

#[derive(Clone)]
pub struct ProximityBroadcaster {
    presence: Arc<dyn PresenceStore>,
    identity: Arc<dyn IdentityStore>,
    registry: SessionRegistry,
    radius_km: f64,
}

impl ProximityBroadcaster {
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        identity: Arc<dyn IdentityStore>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            presence,
            identity,
            registry,
            radius_km: PROXIMITY_RADIUS_KM,
        }
    }

    /// All live rows joined with display attributes. Identity lookups that
    /// fail leave the entries anonymous.
    pub async fn live_users(&self) -> AppResult<Vec<LiveUser>> {
        let sessions: Vec<LiveSession> = self.presence.get_all().await?;
        let ids: Vec<UserId> = sessions.iter().map(|s| s.user_id).collect();
        let mut attrs = match self.identity.display_attributes_many(&ids).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "display attributes unavailable");
                Default::default()
            }
        };
        Ok(sessions
            .iter()
            .map(|s| LiveUser::from_session(s, attrs.remove(&s.user_id).unwrap_or_default()))
            .collect())
    }

    /// One pass over every registered user. Returns how many snapshots were delivered.
    #[instrument(skip(self))]
    pub async fn broadcast(&self) -> usize {
        let users = match self.live_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "presence read failed, skipping broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        for viewer_id in self.registry.user_ids().await {
            let Some(viewer) = users.iter().find(|u| u.user_id == viewer_id) else {
                continue;
            };
            let event = ServerMessage::ActiveUsers {
                users: snapshot_for(viewer, &users, self.radius_km),
            };
            if self.registry.send_event(viewer_id, &event).await {
                delivered += 1;
            }
        }
        debug!(live = users.len(), delivered, "proximity broadcast");
        delivered
    }
}

/// Personalized view of `users` for `viewer`.
pub fn snapshot_for(viewer: &LiveUser, users: &[LiveUser], radius_km: f64) -> Vec<NearbyUser> {
    nearby(viewer, users, radius_km)
        .into_iter()
        .filter_map(|n| {
            let u = n.candidate;
            Some(NearbyUser {
                user_id: u.user_id,
                lat: u.lat?,
                lon: u.lon?,
                distance: (n.distance_km * 100.0).round() / 100.0,
                is_me: n.is_self,
                status: u.status,
                name: u.name.clone(),
                category: u.category.clone(),
            })
        })
        .collect()
}
