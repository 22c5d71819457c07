//! Scripted stranger used when no human is around: keyword replies with typing pauses.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, instrument};

use super::registry::SessionRegistry;
use crate::models::event::ServerMessage;
use crate::models::presence::UserId;

const GREETINGS: &[&str] = &["hey", "hi there", "hello", "asl?", "sup", "hows it going?"];
const DEMOGRAPHIC: &[&str] = &["19 m uk", "20 f us", "18 m india", "22 f canada", "21 m aus"];
const BOREDOM: &[&str] = &["yea same", "im bored too", "this place is cool though", "u chat here often?"];
const FAREWELL: &[&str] = &["gtg", "bye!", "see ya", "talk later"];
const FILLER: &[&str] = &["lol", "nvm", "chill", "cool", "oh nice", "same here", "wow", "interesting"];

/// Reply set picked by keyword, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCategory {
    Demographic,
    Boredom,
    Farewell,
    Filler,
}

impl ReplyCategory {
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("asl") {
            ReplyCategory::Demographic
        } else if text.contains("bored") || text.contains("nothing") {
            ReplyCategory::Boredom
        } else if text.contains("bye") || text.contains("gtg") {
            ReplyCategory::Farewell
        } else {
            ReplyCategory::Filler
        }
    }

    pub fn lines(&self) -> &'static [&'static str] {
        match self {
            ReplyCategory::Demographic => DEMOGRAPHIC,
            ReplyCategory::Boredom => BOREDOM,
            ReplyCategory::Farewell => FAREWELL,
            ReplyCategory::Filler => FILLER,
        }
    }
}

fn pick(lines: &'static [&'static str]) -> &'static str {
    lines
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FILLER[0])
}

/// Canned answer to `text`, uniformly random within its category.
pub fn reply(text: &str) -> &'static str {
    pick(ReplyCategory::classify(text).lines())
}

/// Opening line after a bot match.
pub fn greeting() -> &'static str {
    pick(GREETINGS)
}

/// Delays that make the bot read like a person typing.
#[derive(Debug, Clone)]
pub struct BotPacing {
    /// Pause between `match_found` and the bot starting to type its greeting.
    pub greeting_delay: Duration,
    /// Typing time for the greeting.
    pub greeting_typing: Duration,
    pub reply_min: Duration,
    pub reply_max: Duration,
}

impl Default for BotPacing {
    fn default() -> Self {
        Self {
            greeting_delay: Duration::from_millis(1000),
            greeting_typing: Duration::from_millis(1500),
            reply_min: Duration::from_secs(1),
            reply_max: Duration::from_secs(3),
        }
    }
}

impl BotPacing {
    /// No delays at all.
    pub fn instant() -> Self {
        Self {
            greeting_delay: Duration::ZERO,
            greeting_typing: Duration::ZERO,
            reply_min: Duration::ZERO,
            reply_max: Duration::ZERO,
        }
    }

    fn reply_delay(&self) -> Duration {
        if self.reply_max <= self.reply_min {
            return self.reply_min;
        }
        rand::thread_rng().gen_range(self.reply_min..=self.reply_max)
    }
}

/// Talks to one user at a time through the registry.
#[derive(Clone)]
pub struct BotResponder {
    registry: SessionRegistry,
    pacing: BotPacing,
}

impl BotResponder {
    pub fn new(registry: SessionRegistry, pacing: BotPacing) -> Self {
        Self { registry, pacing }
    }

    /// Typing indicator, a pause, then the reply.
    #[instrument(skip(self, text))]
    pub async fn respond(&self, user_id: UserId, text: &str) {
        let answer = reply(text);
        self.registry
            .send_event(user_id, &ServerMessage::BotTyping { state: true })
            .await;
        tokio::time::sleep(self.pacing.reply_delay()).await;
        self.registry
            .send_event(user_id, &ServerMessage::bot_says(answer))
            .await;
        debug!(user_id, reply = answer, "bot replied");
    }

    /// Opening message after a bot match.
    #[instrument(skip(self))]
    pub async fn greet(&self, user_id: UserId) {
        tokio::time::sleep(self.pacing.greeting_delay).await;
        self.registry
            .send_event(user_id, &ServerMessage::BotTyping { state: true })
            .await;
        tokio::time::sleep(self.pacing.greeting_typing).await;
        let line = greeting();
        self.registry
            .send_event(user_id, &ServerMessage::bot_says(line))
            .await;
        debug!(user_id, greeting = line, "bot greeted");
    }
}
