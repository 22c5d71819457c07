//! Business logic: session registry, matchmaking, proximity broadcasts, relay and bot.

pub mod bot;
pub mod geo;
pub mod matchmaking;
pub mod proximity;
pub mod registry;
pub mod relay;

pub use bot::{BotPacing, BotResponder};
pub use matchmaking::{MatchOutcome, MatchSettings, MatchmakingService};
pub use proximity::ProximityBroadcaster;
pub use registry::{Liveness, LivenessGuard, SessionRegistry};
pub use relay::RelayRouter;
