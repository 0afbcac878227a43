use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::{
    common::{
        errors::Result,
        types::{ChannelId, GuildId},
    },
    configs::{Config, PlayerConfig},
    events::{EventHandler, EventHub},
    player::{Player, PlayerRegistry},
    protocol::ServerStats,
    router::EventRouter,
    transport::{SocketTransport, Transport},
    voice::{PlatformGateway, VoiceCoordinator, VoiceServerUpdate, VoiceState},
};

/// Entry point for bot code: owns the players of every guild and wires the
/// platform's voice callbacks and the node's messages to them.
pub struct LavaClient {
    settings: PlayerConfig,
    transport: Arc<dyn Transport>,
    gateway: Arc<dyn PlatformGateway>,
    registry: Arc<PlayerRegistry>,
    events: Arc<EventHub>,
    router: Arc<EventRouter>,
    voice: VoiceCoordinator,
}

impl LavaClient {
    /// Builds a client over an existing transport. Inbound node messages are
    /// fed in through [`LavaClient::handle_message`].
    pub fn new(
        settings: PlayerConfig,
        transport: Arc<dyn Transport>,
        gateway: Arc<dyn PlatformGateway>,
    ) -> Self {
        let registry = Arc::new(PlayerRegistry::new());
        let events = Arc::new(EventHub::new());
        let router = Arc::new(EventRouter::new(registry.clone(), events.clone()));
        let voice = VoiceCoordinator::new(
            gateway.clone(),
            transport.clone(),
            registry.clone(),
            events.clone(),
        );

        Self {
            settings,
            transport,
            gateway,
            registry,
            events,
            router,
            voice,
        }
    }

    /// Opens a websocket to the configured node and routes everything it
    /// sends. Must be called inside a Tokio runtime.
    pub fn connect_node(config: &Config, gateway: Arc<dyn PlatformGateway>) -> Arc<Self> {
        let (sink, inbound) = flume::unbounded::<String>();
        let transport =
            SocketTransport::spawn(config.node.clone(), gateway.current_user_id(), sink);
        let client = Arc::new(Self::new(config.player.clone(), transport, gateway));

        let router = client.router.clone();
        tokio::spawn(async move {
            while let Ok(raw) = inbound.recv_async().await {
                router.handle(&raw).await;
            }
            trace!("node message stream closed");
        });

        client
    }

    /// Returns the guild's player, creating it and asking the platform to
    /// join `voice_channel` if needed.
    ///
    /// Idempotent: a live player is returned as is. If it sits in another
    /// channel the platform is asked to move it; the player's channel only
    /// changes once the platform accepted.
    pub async fn connect(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> Result<Arc<Player>> {
        let mut created = false;
        let player = self.registry.get_or_create(guild_id, || {
            created = true;
            Player::new(
                guild_id,
                voice_channel,
                text_channel,
                self.settings.default_volume,
                self.transport.clone(),
            )
        });

        if !created {
            if text_channel.is_some() {
                player.set_text_channel(text_channel).await;
            }
            if player.voice_channel().await == voice_channel {
                debug!("[{}] already connected to {}", guild_id, voice_channel);
                return Ok(player);
            }
        }

        info!("[{}] joining voice channel {}", guild_id, voice_channel);
        let joined = self
            .gateway
            .update_voice_state(
                guild_id,
                Some(voice_channel),
                self.settings.self_mute,
                self.settings.self_deaf,
            )
            .await;

        if let Err(e) = joined {
            warn!("[{}] failed to join voice channel: {}", guild_id, e);
            if created && let Some(player) = self.registry.remove(guild_id) {
                let _ = player.dispose().await;
                self.events.close_lane(guild_id);
            }
            return Err(e);
        }

        if !created {
            player.set_voice_channel(voice_channel).await;
        }
        Ok(player)
    }

    /// Destroys the guild's player and asks the platform to leave voice.
    pub async fn disconnect(&self, guild_id: GuildId) -> Result<()> {
        let disposed = match self.registry.remove(guild_id) {
            Some(player) => {
                info!("[{}] disconnecting player", guild_id);
                let disposed = player.dispose().await;
                self.events.close_lane(guild_id);
                disposed
            }
            None => Ok(()),
        };

        self.gateway
            .update_voice_state(
                guild_id,
                None,
                self.settings.self_mute,
                self.settings.self_deaf,
            )
            .await
            .inspect_err(|e| warn!("[{}] failed to leave voice channel: {}", guild_id, e))?;

        disposed
    }

    pub fn player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.registry.get(guild_id).filter(|p| !p.is_destroyed())
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.registry
            .players()
            .into_iter()
            .filter(|p| !p.is_destroyed())
            .collect()
    }

    pub fn server_stats(&self) -> Option<ServerStats> {
        self.router.server_stats()
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.events.subscribe(handler);
    }

    /// Routes one raw node message. Returns whether it was acted upon.
    pub async fn handle_message(&self, raw: &str) -> bool {
        self.router.handle(raw).await
    }

    pub async fn on_voice_state_update(
        &self,
        old: Option<&VoiceState>,
        new: &VoiceState,
    ) -> Result<()> {
        self.voice.on_voice_state_update(old, new).await
    }

    pub async fn on_voice_server_update(&self, update: &VoiceServerUpdate) -> Result<()> {
        self.voice.on_voice_server_update(update).await
    }

    /// Waits until observers have seen every event emitted so far.
    pub async fn flush_events(&self) {
        self.events.flush().await;
    }
}
