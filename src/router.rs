use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::{
    common::{errors::LavaError, types::GuildId},
    events::{ClientEvent, EventHub},
    player::{Player, PlayerRegistry},
    protocol::{IncomingMessage, PlayerUpdateState, ServerStats, TrackEvent},
};

/// Turns raw node frames into player transitions and observer events.
///
/// Owns the process-wide stats slot. Player state changes happen inline, in
/// arrival order; observers are notified through the [`EventHub`] so a slow
/// handler never holds up the socket.
pub struct EventRouter {
    registry: Arc<PlayerRegistry>,
    events: Arc<EventHub>,
    stats: RwLock<Option<ServerStats>>,
}

impl EventRouter {
    pub fn new(registry: Arc<PlayerRegistry>, events: Arc<EventHub>) -> Self {
        Self {
            registry,
            events,
            stats: RwLock::new(None),
        }
    }

    /// Last stats the node pushed.
    pub fn server_stats(&self) -> Option<ServerStats> {
        self.stats.read().clone()
    }

    /// Handles one frame. Returns whether it was acted upon; malformed
    /// frames are reported to `on_error` observers and dropped.
    pub async fn handle(&self, raw: &str) -> bool {
        let message = match IncomingMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping node message: {}", e);
                trace!("offending message: {}", raw);
                self.events.report(e);
                return false;
            }
        };

        match message {
            IncomingMessage::Ready {
                resumed,
                session_id,
            } => {
                debug!(
                    "node ready (resumed={}, session={}); nothing to do",
                    resumed,
                    session_id.as_deref().unwrap_or("-")
                );
                false
            }
            IncomingMessage::Stats(stats) => {
                self.on_stats(stats);
                true
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                self.on_player_update(guild_id, state).await
            }
            IncomingMessage::Event { guild_id, event } => self.on_event(guild_id, event).await,
            IncomingMessage::Unknown { op } => {
                debug!("ignoring unhandled node op '{}'", op);
                false
            }
        }
    }

    fn on_stats(&self, stats: ServerStats) {
        trace!(
            "stats: {} players, {} playing",
            stats.players, stats.playing_players
        );
        *self.stats.write() = Some(stats.clone());
        self.events.emit(ClientEvent::StatsReceived(stats));
    }

    async fn on_player_update(&self, guild_id: GuildId, state: PlayerUpdateState) -> bool {
        let Some(player) = self.player(guild_id) else {
            return false;
        };

        if !player.update_state(&state).await {
            return false;
        }

        let track = player.track().await;
        if player.is_destroyed() {
            return false;
        }
        self.events.emit(ClientEvent::PlayerUpdated {
            player,
            track,
            position: Duration::from_millis(state.position),
        });
        true
    }

    async fn on_event(&self, guild_id: GuildId, event: TrackEvent) -> bool {
        let Some(player) = self.player(guild_id) else {
            return false;
        };

        let client_event = match event {
            TrackEvent::TrackStart { track } => {
                player.mark_started(track.as_ref()).await;
                let track = match track {
                    Some(track) => Some(track),
                    None => player.track().await,
                };
                ClientEvent::TrackStarted { player, track }
            }
            TrackEvent::TrackEnd { track, reason } => {
                let cleared = player.clear_track(track.as_ref(), Some(reason)).await;
                debug!("[{}] track ended: {:?}", guild_id, reason);
                ClientEvent::TrackFinished {
                    player,
                    track: track.or(cleared),
                    reason,
                }
            }
            TrackEvent::TrackException { track, exception } => {
                let cleared = player.clear_track(track.as_ref(), None).await;
                warn!("[{}] track exception: {}", guild_id, exception.describe());
                ClientEvent::TrackException {
                    player,
                    track: track.or(cleared),
                    exception,
                }
            }
            TrackEvent::TrackStuck {
                track,
                threshold_ms,
            } => {
                let cleared = player.clear_track(track.as_ref(), None).await;
                warn!("[{}] track stuck for {}ms", guild_id, threshold_ms);
                ClientEvent::TrackStuck {
                    player,
                    track: track.or(cleared),
                    threshold_ms,
                }
            }
            TrackEvent::WebSocketClosed {
                code,
                reason,
                by_remote,
            } => {
                warn!(
                    "[{}] node voice socket closed: code={}, reason='{}', by_remote={}",
                    guild_id, code, reason, by_remote
                );
                ClientEvent::WebSocketClosed {
                    player,
                    code,
                    reason,
                    by_remote,
                }
            }
        };

        // A disconnect may have raced the transition.
        if client_event.player().is_some_and(|p| p.is_destroyed()) {
            debug!("[{}] player destroyed mid-event; not notifying", guild_id);
            return false;
        }

        self.events.emit(client_event);
        true
    }

    /// Looks a guild's player up; a miss is expected while the node lags
    /// behind a destroy.
    fn player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        let player = self.registry.get(guild_id).filter(|p| !p.is_destroyed());
        if player.is_none() {
            debug!("{}", LavaError::UnknownGuild(guild_id));
        }
        player
    }
}
