//! Matchmaking: claim a searching peer with a conditional write, wait a bounded
//! time for one to show up, otherwise hand the user to the bot.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::proximity::ProximityBroadcaster;
use super::registry::{Liveness, SessionRegistry};
use crate::error::AppResult;
use crate::models::event::ServerMessage;
use crate::models::presence::{SessionStatus, StatusFilter, UserId};
use crate::repositories::PresenceStore;

#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Wait-loop iterations after a failed immediate claim.
    pub wait_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            wait_attempts: 7,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// How one `search_nearest` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// This search claimed the peer; both sides were notified.
    Paired(UserId),
    /// Another initiator claimed this user and already notified it.
    ClaimedByPeer,
    /// Nobody showed up; the user now talks to the bot.
    Bot,
    /// The socket closed or the row vanished mid-search.
    Cancelled,
}

#[derive(Clone)]
pub struct MatchmakingService {
    presence: Arc<dyn PresenceStore>,
    registry: SessionRegistry,
    broadcaster: ProximityBroadcaster,
    settings: MatchSettings,
}

impl MatchmakingService {
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        registry: SessionRegistry,
        broadcaster: ProximityBroadcaster,
        settings: MatchSettings,
    ) -> Self {
        Self {
            presence,
            registry,
            broadcaster,
            settings,
        }
    }

    /// Run one search cycle for `user_id` at `(lat, lon)`, then refresh everyone's map.
    #[instrument(skip(self, liveness))]
    pub async fn search(
        &self,
        user_id: UserId,
        lat: f64,
        lon: f64,
        liveness: &Liveness,
    ) -> AppResult<MatchOutcome> {
        let outcome = self.run_search(user_id, lat, lon, liveness).await;
        self.broadcaster.broadcast().await;
        outcome
    }

    async fn run_search(
        &self,
        user_id: UserId,
        lat: f64,
        lon: f64,
        liveness: &Liveness,
    ) -> AppResult<MatchOutcome> {
        self.presence
            .upsert(user_id, lat, lon, SessionStatus::Searching)
            .await?;

        match self.try_claim(user_id).await {
            Ok(Some(peer)) => return Ok(MatchOutcome::Paired(peer)),
            Ok(None) => {}
            Err(e) => warn!(user_id, error = %e, "immediate claim failed"),
        }

        for attempt in 1..=self.settings.wait_attempts {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = liveness.closed() => {
                    debug!(user_id, attempt, "socket closed, search cancelled");
                    return Ok(MatchOutcome::Cancelled);
                }
            }

            match self.presence.get(user_id).await {
                Ok(None) => return Ok(MatchOutcome::Cancelled),
                Ok(Some(row)) if row.status != SessionStatus::Searching => {
                    info!(user_id, attempt, "claimed by another searcher");
                    return Ok(MatchOutcome::ClaimedByPeer);
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    warn!(user_id, attempt, error = %e, "presence read failed");
                    continue;
                }
            }

            match self.try_claim(user_id).await {
                Ok(Some(peer)) => return Ok(MatchOutcome::Paired(peer)),
                Ok(None) => {}
                Err(e) => warn!(user_id, attempt, error = %e, "claim attempt failed"),
            }
        }

        self.fall_back_to_bot(user_id).await
    }

    /// Claim the longest-waiting searcher together with `user_id`. Succeeds only
    /// when the store confirms both rows moved from searching to chatting.
    async fn try_claim(&self, user_id: UserId) -> AppResult<Option<UserId>> {
        let Some(peer) = self.presence.searching_peers(user_id).await?.into_iter().next() else {
            return Ok(None);
        };

        let filter = StatusFilter::new(vec![user_id, peer], SessionStatus::Searching);
        let changed = self
            .presence
            .conditional_update(&filter, SessionStatus::Chatting)
            .await?;
        if changed != filter.user_ids.len() as u64 {
            debug!(user_id, peer_id = peer, changed, "claim lost");
            return Ok(None);
        }

        info!(user_id, peer_id = peer, "human pairing confirmed");
        self.registry
            .send_event(user_id, &ServerMessage::human_match(peer))
            .await;
        self.registry
            .send_event(peer, &ServerMessage::human_match(user_id))
            .await;
        Ok(Some(peer))
    }

    async fn fall_back_to_bot(&self, user_id: UserId) -> AppResult<MatchOutcome> {
        let filter = StatusFilter::new(vec![user_id], SessionStatus::Searching);
        let changed = self
            .presence
            .conditional_update(&filter, SessionStatus::Chatting)
            .await?;
        if changed == 0 {
            // Someone claimed us between the last poll and now, or we are gone.
            return Ok(match self.presence.get(user_id).await? {
                Some(_) => MatchOutcome::ClaimedByPeer,
                None => MatchOutcome::Cancelled,
            });
        }

        info!(user_id, "no peer found, bot fallback");
        self.registry
            .send_event(user_id, &ServerMessage::bot_match())
            .await;
        Ok(MatchOutcome::Bot)
    }
}
