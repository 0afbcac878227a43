use serde::Serialize;

use crate::{
    common::types::{ChannelId, GuildId},
    protocol::tracks::Track,
};

/// Lifecycle of a guild player.
///
/// ```text
/// Idle -> Loading -> Playing <-> Paused
///   ^        |          |          |
///   +--------+----------+----------+   track end / exception / stuck / stop
/// any -> Destroyed                      dispose (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    /// Connected, nothing playing.
    Idle,
    /// `play` sent, waiting for the node's track start.
    Loading,
    Playing,
    Paused,
    Destroyed,
}

impl PlayerStatus {
    pub fn is_live(self) -> bool {
        self != Self::Destroyed
    }

    /// States `play` may be issued from.
    pub fn can_play(self) -> bool {
        matches!(self, Self::Idle | Self::Playing | Self::Paused)
    }

    /// States holding a track the node is (or will be) playing.
    pub fn has_track(self) -> bool {
        matches!(self, Self::Loading | Self::Playing | Self::Paused)
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Options for [`crate::player::Player::play_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayOptions {
    /// Start offset in milliseconds.
    pub start_time: Option<u64>,
    /// Stop the track at this position in milliseconds.
    pub end_time: Option<u64>,
    /// Ask the node to keep the current track if one is playing.
    pub no_replace: bool,
}

/// Point-in-time copy of a player, handed to observers and callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: Option<ChannelId>,
    pub status: PlayerStatus,
    pub track: Option<Track>,
    /// Last position reported by the node, in milliseconds.
    pub position: u64,
    /// Node timestamp of `position`, Unix milliseconds.
    pub last_update: Option<u64>,
    pub volume: u16,
    /// Node's voice connection flag from the last update.
    pub connected: bool,
    /// Voice gateway ping in milliseconds. -1 if unknown.
    pub ping: i64,
}
