use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::{
    common::{errors::Result, types::GuildId},
    events::EventHub,
    player::PlayerRegistry,
    protocol::{OutgoingMessage, VoiceServerEvent},
    transport::Transport,
    voice::{PlatformGateway, VoiceServerUpdate, VoiceSessionContext, VoiceState},
};

/// Bridges the platform's voice callbacks to the node.
///
/// Voice state updates for the bot are cached per guild; a voice server
/// update is only forwarded once the matching session id is known.
pub struct VoiceCoordinator {
    gateway: Arc<dyn PlatformGateway>,
    transport: Arc<dyn Transport>,
    registry: Arc<PlayerRegistry>,
    events: Arc<EventHub>,
    sessions: DashMap<GuildId, VoiceSessionContext>,
}

impl VoiceCoordinator {
    pub fn new(
        gateway: Arc<dyn PlatformGateway>,
        transport: Arc<dyn Transport>,
        registry: Arc<PlayerRegistry>,
        events: Arc<EventHub>,
    ) -> Self {
        Self {
            gateway,
            transport,
            registry,
            events,
            sessions: DashMap::new(),
        }
    }

    /// Cached session for a guild, if the bot's voice state has been seen.
    pub fn session(&self, guild_id: GuildId) -> Option<VoiceSessionContext> {
        self.sessions.get(&guild_id).map(|s| s.value().clone())
    }

    pub async fn on_voice_state_update(
        &self,
        old: Option<&VoiceState>,
        new: &VoiceState,
    ) -> Result<()> {
        if new.user_id != self.gateway.current_user_id() {
            return Ok(());
        }

        let guild_id = new.guild_id;
        let old_channel = old.and_then(|s| s.channel_id);

        match (old_channel, new.channel_id) {
            (Some(_), None) => {
                self.sessions.remove(&guild_id);
                let Some(player) = self.registry.remove(guild_id) else {
                    debug!("[{}] left voice with no player", guild_id);
                    return Ok(());
                };

                info!("[{}] left voice channel; destroying player", guild_id);
                let disposed = player.dispose().await;
                self.events.close_lane(guild_id);
                disposed
            }
            (from, Some(to)) => {
                self.sessions.insert(guild_id, VoiceSessionContext::from(new));
                if from.is_some_and(|from| from != to)
                    && let Some(player) = self.registry.get(guild_id)
                {
                    debug!("[{}] moved to voice channel {}", guild_id, to);
                    player.set_voice_channel(to).await;
                }
                Ok(())
            }
            (None, None) => {
                self.sessions.insert(guild_id, VoiceSessionContext::from(new));
                Ok(())
            }
        }
    }

    pub async fn on_voice_server_update(&self, update: &VoiceServerUpdate) -> Result<()> {
        let Some(guild_id) = update.guild_id else {
            debug!("voice server update without a guild; ignored");
            return Ok(());
        };

        let Some(endpoint) = update.endpoint.as_deref() else {
            debug!("[{}] voice server going away; waiting for a new one", guild_id);
            return Ok(());
        };

        if !self.registry.get(guild_id).is_some_and(|p| !p.is_destroyed()) {
            debug!("[{}] voice server update with no player; ignored", guild_id);
            return Ok(());
        }

        let Some(session) = self.session(guild_id) else {
            debug!(
                "[{}] voice server update before voice state; ignored",
                guild_id
            );
            return Ok(());
        };

        let message = OutgoingMessage::VoiceUpdate {
            guild_id,
            session_id: session.session_id,
            event: VoiceServerEvent {
                token: update.token.clone(),
                guild_id,
                endpoint: endpoint.to_string(),
            },
        };

        debug!("[{}] forwarding voice server {}", guild_id, endpoint);
        self.transport
            .send(&message)
            .await
            .inspect_err(|e| warn!("[{}] failed to forward voice update: {}", guild_id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::{ChannelId, UserId},
        player::{Player, PlayerStatus},
        testing::{BOT_USER, FakeGateway, RecordingTransport},
    };

    struct Fixture {
        coordinator: VoiceCoordinator,
        registry: Arc<PlayerRegistry>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(PlayerRegistry::new());
        let transport = RecordingTransport::new();
        Fixture {
            coordinator: VoiceCoordinator::new(
                FakeGateway::new(),
                transport.clone(),
                registry.clone(),
                Arc::new(EventHub::new()),
            ),
            registry,
            transport,
        }
    }

    impl Fixture {
        fn add_player(&self, guild: u64, channel: u64) -> Arc<Player> {
            self.registry.get_or_create(GuildId(guild), || {
                Player::new(
                    GuildId(guild),
                    ChannelId(channel),
                    None,
                    100,
                    self.transport.clone(),
                )
            })
        }
    }

    fn state(user: UserId, channel: Option<u64>) -> VoiceState {
        VoiceState {
            guild_id: GuildId(1),
            user_id: user,
            channel_id: channel.map(ChannelId),
            session_id: "session-abc".into(),
        }
    }

    fn server(endpoint: Option<&str>) -> VoiceServerUpdate {
        VoiceServerUpdate {
            guild_id: Some(GuildId(1)),
            endpoint: endpoint.map(str::to_string),
            token: "tok".into(),
        }
    }

    #[tokio::test]
    async fn join_sends_exactly_one_voice_update() {
        let f = fixture();
        f.add_player(1, 10);

        f.coordinator
            .on_voice_state_update(None, &state(BOT_USER, Some(10)))
            .await
            .unwrap();
        f.coordinator
            .on_voice_server_update(&server(Some("us-east1.discord.media:443")))
            .await
            .unwrap();

        assert_eq!(f.transport.ops(), vec!["voiceUpdate"]);
        let json = f.transport.messages()[0].to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["guildId"], "1");
        assert_eq!(value["sessionId"], "session-abc");
        assert_eq!(value["event"]["token"], "tok");
        assert_eq!(value["event"]["endpoint"], "us-east1.discord.media:443");
    }

    #[tokio::test]
    async fn server_update_without_session_is_dropped() {
        let f = fixture();
        f.add_player(1, 10);

        f.coordinator
            .on_voice_server_update(&server(Some("host")))
            .await
            .unwrap();

        assert!(f.transport.ops().is_empty());
    }

    #[tokio::test]
    async fn server_update_without_endpoint_or_player_is_dropped() {
        let f = fixture();
        f.coordinator
            .on_voice_state_update(None, &state(BOT_USER, Some(10)))
            .await
            .unwrap();

        f.coordinator
            .on_voice_server_update(&server(Some("host")))
            .await
            .unwrap();
        f.add_player(1, 10);
        f.coordinator.on_voice_server_update(&server(None)).await.unwrap();

        assert!(f.transport.ops().is_empty());
    }

    #[tokio::test]
    async fn other_users_are_ignored() {
        let f = fixture();
        f.add_player(1, 10);

        f.coordinator
            .on_voice_state_update(None, &state(UserId(999), Some(10)))
            .await
            .unwrap();

        assert!(f.coordinator.session(GuildId(1)).is_none());
    }

    #[tokio::test]
    async fn kicked_twice_destroys_once() {
        let f = fixture();
        let player = f.add_player(1, 10);
        let before = state(BOT_USER, Some(10));
        let after = state(BOT_USER, None);

        f.coordinator
            .on_voice_state_update(Some(&before), &after)
            .await
            .unwrap();
        f.coordinator
            .on_voice_state_update(Some(&before), &after)
            .await
            .unwrap();

        assert!(!f.registry.contains(GuildId(1)));
        assert_eq!(player.status().await, PlayerStatus::Destroyed);
        assert_eq!(f.transport.count("destroy"), 1);
    }

    #[tokio::test]
    async fn channel_move_updates_the_player() {
        let f = fixture();
        let player = f.add_player(1, 10);

        f.coordinator
            .on_voice_state_update(
                Some(&state(BOT_USER, Some(10))),
                &state(BOT_USER, Some(20)),
            )
            .await
            .unwrap();

        assert_eq!(player.voice_channel().await, ChannelId(20));
        assert!(f.transport.ops().is_empty());
    }
}
