use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{
    errors::Result,
    types::{ChannelId, GuildId, UserId},
};

pub mod coordinator;

pub use coordinator::VoiceCoordinator;

/// The chat platform the client is attached to.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// The bot's own user id.
    fn current_user_id(&self) -> UserId;

    /// Asks the platform to move the bot into `channel`, or out of voice
    /// entirely when `channel` is `None`.
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel: Option<ChannelId>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<()>;
}

/// A user's voice state as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceState {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub channel_id: Option<ChannelId>,
    pub session_id: String,
}

/// Credentials for a guild's voice server.
///
/// A missing endpoint means the server is going away and a new one will be
/// announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    pub guild_id: Option<GuildId>,
    pub endpoint: Option<String>,
    pub token: String,
}

/// Last voice state seen for the bot in a guild.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSessionContext {
    pub channel_id: Option<ChannelId>,
    pub session_id: String,
}

impl From<&VoiceState> for VoiceSessionContext {
    fn from(state: &VoiceState) -> Self {
        Self {
            channel_id: state.channel_id,
            session_id: state.session_id.clone(),
        }
    }
}
