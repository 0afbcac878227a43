use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{common::types::GuildId, player::PlayerStatus};

/// Exception severity levels reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    #[serde(alias = "COMMON", alias = "common")]
    Common,
    #[serde(alias = "SUSPICIOUS", alias = "suspicious")]
    Suspicious,
    #[serde(alias = "FAULT", alias = "fault")]
    Fault,
}

/// Failures surfaced by the client layer.
///
/// Parse and lookup failures are contained by the router and the voice
/// coordinator; the remaining variants are returned to whoever asked for the
/// operation.
#[derive(Debug, Error)]
pub enum LavaError {
    /// An inbound node message could not be decoded.
    #[error("malformed node message: {0}")]
    ProtocolParse(String),

    /// A node event referenced a guild with no player.
    #[error("no player for guild {0}")]
    UnknownGuild(GuildId),

    /// The player is not in a state that allows the operation.
    #[error("cannot {operation} player {guild} while {state}")]
    InvalidState {
        guild: GuildId,
        operation: &'static str,
        state: PlayerStatus,
    },

    /// Sending to, or connecting to, the node failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The player was disposed before the operation ran.
    #[error("player {0} is destroyed")]
    AlreadyDestroyed(GuildId),

    /// A live player already exists for the guild.
    #[error("guild {0} already has a connected player")]
    AlreadyConnected(GuildId),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// An event handler failed or panicked.
    #[error("event handler failed in {event}: {message}")]
    Handler { event: &'static str, message: String },
}

impl From<serde_json::Error> for LavaError {
    fn from(e: serde_json::Error) -> Self {
        Self::ProtocolParse(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LavaError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, LavaError>;
