//! Wire frames exchanged over the chat socket. Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::presence::{SessionStatus, UserId};

/// Display name the bot uses when announced as a match.
pub const BOT_DISPLAY_NAME: &str = "Stranger";
/// `from` marker on messages authored by the bot.
pub const BOT_AUTHOR: &str = "stranger";

/// Inbound frame from a connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SearchNearest(SearchRequest),
    LogMsg(ChatLine),
    Ping(PingPayload),
    Offer(Signal),
    Answer(Signal),
    Ice(Signal),
    /// Any kind this server does not know; ignored.
    #[serde(other)]
    Unknown,
}

/// Missing and `null` coordinates both mean 0.0.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct SearchRequest {
    #[serde(default)]
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: Option<f64>,
    #[serde(default)]
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: Option<f64>,
}

impl SearchRequest {
    pub fn lat(&self) -> f64 {
        self.lat.unwrap_or(0.0)
    }

    pub fn lon(&self) -> f64 {
        self.lon.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatLine {
    #[serde(default)]
    pub peer_id: Option<UserId>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingPayload {
    /// Echoed back untouched; clients put whatever clock value they like here.
    #[serde(default)]
    pub ts: serde_json::Value,
}

/// Call-signaling envelope. Only `peer_id` is read; the frame is relayed verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Signal {
    #[serde(default)]
    pub peer_id: Option<UserId>,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid frame: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl ClientMessage {
    /// Decode and validate one text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let msg: ClientMessage = serde_json::from_str(text)?;
        if let ClientMessage::SearchNearest(req) = &msg {
            req.validate()?;
        }
        Ok(msg)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SearchNearest(_) => "search_nearest",
            ClientMessage::LogMsg(_) => "log_msg",
            ClientMessage::Ping(_) => "ping",
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::Ice(_) => "ice",
            ClientMessage::Unknown => "unknown",
        }
    }
}

/// Outbound frame pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ActiveUsers {
        users: Vec<NearbyUser>,
    },
    MatchFound {
        peer_id: UserId,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_bot: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bot_name: Option<String>,
    },
    BotTyping {
        state: bool,
    },
    ChatMsg {
        peer_id: UserId,
        text: String,
        from: String,
    },
    Pong {
        #[serde(default)]
        ts: serde_json::Value,
    },
}

impl ServerMessage {
    pub fn human_match(peer_id: UserId) -> Self {
        ServerMessage::MatchFound {
            peer_id,
            is_bot: false,
            bot_name: None,
        }
    }

    pub fn bot_match() -> Self {
        ServerMessage::MatchFound {
            peer_id: super::presence::BOT_PEER_ID,
            is_bot: true,
            bot_name: Some(BOT_DISPLAY_NAME.to_string()),
        }
    }

    pub fn bot_says(text: impl Into<String>) -> Self {
        ServerMessage::ChatMsg {
            peer_id: super::presence::BOT_PEER_ID,
            text: text.into(),
            from: BOT_AUTHOR.to_string(),
        }
    }
}

/// One entry of a proximity snapshot, as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyUser {
    pub user_id: UserId,
    pub lat: f64,
    pub lon: f64,
    /// Kilometres from the viewer, rounded to 10 m.
    pub distance: f64,
    pub is_me: bool,
    pub status: SessionStatus,
    pub name: Option<String>,
    pub category: Option<String>,
}
