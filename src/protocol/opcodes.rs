use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    common::{
        errors::{LavaError, Result},
        types::GuildId,
    },
    protocol::{events::TrackEvent, stats::ServerStats},
};

/// `state` object of a `playerUpdate` message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateState {
    /// Node clock, Unix milliseconds.
    pub time: u64,
    /// Position in milliseconds. Older nodes omit it while nothing plays.
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub connected: Option<bool>,
    /// Voice gateway ping in milliseconds. -1 if not connected.
    #[serde(default)]
    pub ping: Option<i64>,
}

/// Messages received from the node, after `op` dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Ready {
        resumed: bool,
        session_id: Option<String>,
    },
    Stats(ServerStats),
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerUpdateState,
    },
    Event {
        guild_id: GuildId,
        event: TrackEvent,
    },
    /// An op, or an event type, this client does not handle.
    Unknown { op: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadyBody {
    #[serde(default)]
    resumed: bool,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerUpdateBody {
    guild_id: GuildId,
    state: PlayerUpdateState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventHeader {
    guild_id: GuildId,
    #[serde(rename = "type")]
    kind: String,
}

impl IncomingMessage {
    /// Parses one raw socket frame.
    ///
    /// Unknown ops and event types come back as [`IncomingMessage::Unknown`];
    /// only structurally broken messages are errors.
    pub fn parse(raw: &str) -> Result<Self> {
        let json: Value = serde_json::from_str(raw)?;
        let op = json
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| LavaError::ProtocolParse("missing op".into()))?
            .to_string();

        let message = match op.as_str() {
            "ready" => {
                let body: ReadyBody = serde_json::from_value(json)?;
                Self::Ready {
                    resumed: body.resumed,
                    session_id: body.session_id,
                }
            }
            "stats" => Self::Stats(serde_json::from_value(json)?),
            "playerUpdate" => {
                let body: PlayerUpdateBody = serde_json::from_value(json)?;
                Self::PlayerUpdate {
                    guild_id: body.guild_id,
                    state: body.state,
                }
            }
            "event" => {
                let header = EventHeader::deserialize(&json)?;
                match TrackEvent::from_json(&header.kind, json)? {
                    Some(event) => Self::Event {
                        guild_id: header.guild_id,
                        event,
                    },
                    None => Self::Unknown {
                        op: format!("event:{}", header.kind),
                    },
                }
            }
            _ => Self::Unknown { op },
        };

        Ok(message)
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::PlayerUpdate { guild_id, .. } | Self::Event { guild_id, .. } => Some(*guild_id),
            _ => None,
        }
    }
}

/// Discord `VOICE_SERVER_UPDATE` data forwarded to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerEvent {
    pub token: String,
    pub guild_id: GuildId,
    pub endpoint: String,
}

/// Messages sent from this client to the node over the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Play {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        track: String,
        #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
        start_time: Option<u64>,
        #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
        end_time: Option<u64>,
        #[serde(rename = "noReplace", skip_serializing_if = "std::ops::Not::not")]
        no_replace: bool,
    },
    Stop {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
    },
    Pause {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        pause: bool,
    },
    Seek {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        position: u64,
    },
    Volume {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        volume: u16,
    },
    Destroy {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
    },
    VoiceUpdate {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        #[serde(rename = "sessionId")]
        session_id: String,
        event: VoiceServerEvent,
    },
}

impl OutgoingMessage {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::Play { guild_id, .. }
            | Self::Stop { guild_id }
            | Self::Pause { guild_id, .. }
            | Self::Seek { guild_id, .. }
            | Self::Volume { guild_id, .. }
            | Self::Destroy { guild_id }
            | Self::VoiceUpdate { guild_id, .. } => *guild_id,
        }
    }

    /// Wire name of the op, for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Stop { .. } => "stop",
            Self::Pause { .. } => "pause",
            Self::Seek { .. } => "seek",
            Self::Volume { .. } => "volume",
            Self::Destroy { .. } => "destroy",
            Self::VoiceUpdate { .. } => "voiceUpdate",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LavaError::Transport(e.to_string()))
    }
}
