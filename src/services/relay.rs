//! Relay router: dispatches each inbound frame of a connection by kind.

use tracing::{debug, info, instrument, warn};

use super::bot::BotResponder;
use super::matchmaking::{MatchOutcome, MatchmakingService};
use super::registry::{Liveness, SessionRegistry};
use crate::models::event::{ChatLine, ClientMessage, ServerMessage};
use crate::models::presence::{UserId, BOT_PEER_ID};

#[derive(Clone)]
pub struct RelayRouter {
    registry: SessionRegistry,
    matchmaking: MatchmakingService,
    bot: BotResponder,
}

impl RelayRouter {
    pub fn new(registry: SessionRegistry, matchmaking: MatchmakingService, bot: BotResponder) -> Self {
        Self {
            registry,
            matchmaking,
            bot,
        }
    }

    /// Handle one text frame from `user_id`. Frames that do not parse are dropped.
    #[instrument(skip(self, raw, liveness))]
    pub async fn dispatch(&self, user_id: UserId, raw: &str, liveness: &Liveness) {
        let msg = match ClientMessage::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(user_id, error = %e, "ignoring frame");
                return;
            }
        };

        let kind = msg.kind();
        match msg {
            ClientMessage::SearchNearest(req) => {
                let (lat, lon) = (req.lat(), req.lon());
                info!(user_id, lat, lon, "search started");
                match self.matchmaking.search(user_id, lat, lon, liveness).await {
                    Ok(MatchOutcome::Bot) => self.bot.greet(user_id).await,
                    Ok(outcome) => debug!(user_id, ?outcome, "search finished"),
                    Err(e) => warn!(user_id, error = %e, "search failed"),
                }
            }
            ClientMessage::LogMsg(line) => self.chat(user_id, line).await,
            ClientMessage::Ping(ping) => {
                self.registry
                    .send_event(user_id, &ServerMessage::Pong { ts: ping.ts })
                    .await;
            }
            ClientMessage::Offer(signal) | ClientMessage::Answer(signal) | ClientMessage::Ice(signal) => {
                self.relay_signal(user_id, kind, signal.peer_id, raw).await;
            }
            ClientMessage::Unknown => debug!(user_id, "unknown frame kind"),
        }
    }

    async fn chat(&self, user_id: UserId, line: ChatLine) {
        info!(user_id, peer_id = ?line.peer_id, text = %line.text, "chat line");
        // Human-to-human text is not relayed here; clients carry it on their own channel.
        if line.peer_id == Some(BOT_PEER_ID) {
            self.bot.respond(user_id, &line.text).await;
        }
    }

    /// Forward the raw frame to the declared peer. The peer id is trusted as sent.
    async fn relay_signal(&self, user_id: UserId, kind: &str, peer_id: Option<UserId>, raw: &str) {
        match peer_id {
            Some(peer) if peer != BOT_PEER_ID => {
                let delivered = self.registry.send(peer, raw.to_string()).await;
                debug!(user_id, peer_id = peer, kind, delivered, "signal relayed");
            }
            _ => debug!(user_id, kind, "signal without a human peer dropped"),
        }
    }
}
