use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    common::{errors::LavaError, types::{AnyResult, GuildId}},
    player::Player,
    protocol::{ServerStats, TrackEndReason, TrackException, tracks::Track},
};

pub mod dispatch;

pub use dispatch::EventHub;

/// Observer for client events. Every method defaults to a no-op, so an
/// implementation only overrides what it cares about.
///
/// Handlers are called in subscription order. One handler returning `Err`
/// or panicking is logged and reported through [`EventHandler::on_error`];
/// the remaining handlers still run. Events for one guild arrive in the
/// order the node sent them.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn stats_received(&self, _stats: &ServerStats) -> AnyResult<()> {
        Ok(())
    }

    async fn player_updated(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _position: Duration,
    ) -> AnyResult<()> {
        Ok(())
    }

    async fn track_started(&self, _player: &Arc<Player>, _track: Option<&Track>) -> AnyResult<()> {
        Ok(())
    }

    async fn track_finished(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _reason: TrackEndReason,
    ) -> AnyResult<()> {
        Ok(())
    }

    async fn track_exception(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _exception: &TrackException,
    ) -> AnyResult<()> {
        Ok(())
    }

    async fn track_stuck(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _threshold_ms: u64,
    ) -> AnyResult<()> {
        Ok(())
    }

    /// The node lost its voice connection for this guild. Player state is
    /// left untouched; the platform's voice state decides whether it goes.
    async fn websocket_closed(
        &self,
        _player: &Arc<Player>,
        _code: u16,
        _reason: &str,
        _by_remote: bool,
    ) -> AnyResult<()> {
        Ok(())
    }

    /// Malformed node messages and failing handlers end up here.
    async fn on_error(&self, _error: &LavaError) {}
}

/// An event queued for observers.
#[derive(Debug)]
pub enum ClientEvent {
    StatsReceived(ServerStats),
    PlayerUpdated {
        player: Arc<Player>,
        track: Option<Track>,
        position: Duration,
    },
    TrackStarted {
        player: Arc<Player>,
        track: Option<Track>,
    },
    TrackFinished {
        player: Arc<Player>,
        track: Option<Track>,
        reason: TrackEndReason,
    },
    TrackException {
        player: Arc<Player>,
        track: Option<Track>,
        exception: TrackException,
    },
    TrackStuck {
        player: Arc<Player>,
        track: Option<Track>,
        threshold_ms: u64,
    },
    WebSocketClosed {
        player: Arc<Player>,
        code: u16,
        reason: String,
        by_remote: bool,
    },
    Error(LavaError),
}

impl ClientEvent {
    /// Player the event is about; `None` for stats and errors.
    pub fn player(&self) -> Option<&Arc<Player>> {
        match self {
            Self::StatsReceived(_) | Self::Error(_) => None,
            Self::PlayerUpdated { player, .. }
            | Self::TrackStarted { player, .. }
            | Self::TrackFinished { player, .. }
            | Self::TrackException { player, .. }
            | Self::TrackStuck { player, .. }
            | Self::WebSocketClosed { player, .. } => Some(player),
        }
    }

    /// Guild whose lane carries the event; `None` for the global lane.
    pub fn guild_id(&self) -> Option<GuildId> {
        self.player().map(|p| p.guild_id())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StatsReceived(_) => "stats_received",
            Self::PlayerUpdated { .. } => "player_updated",
            Self::TrackStarted { .. } => "track_started",
            Self::TrackFinished { .. } => "track_finished",
            Self::TrackException { .. } => "track_exception",
            Self::TrackStuck { .. } => "track_stuck",
            Self::WebSocketClosed { .. } => "websocket_closed",
            Self::Error(_) => "on_error",
        }
    }

    /// Runs one handler for this event.
    pub(crate) async fn deliver(&self, handler: &dyn EventHandler) -> AnyResult<()> {
        match self {
            Self::StatsReceived(stats) => handler.stats_received(stats).await,
            Self::PlayerUpdated {
                player,
                track,
                position,
            } => {
                handler
                    .player_updated(player, track.as_ref(), *position)
                    .await
            }
            Self::TrackStarted { player, track } => {
                handler.track_started(player, track.as_ref()).await
            }
            Self::TrackFinished {
                player,
                track,
                reason,
            } => {
                handler
                    .track_finished(player, track.as_ref(), *reason)
                    .await
            }
            Self::TrackException {
                player,
                track,
                exception,
            } => {
                handler
                    .track_exception(player, track.as_ref(), exception)
                    .await
            }
            Self::TrackStuck {
                player,
                track,
                threshold_ms,
            } => {
                handler
                    .track_stuck(player, track.as_ref(), *threshold_ms)
                    .await
            }
            Self::WebSocketClosed {
                player,
                code,
                reason,
                by_remote,
            } => {
                handler
                    .websocket_closed(player, *code, reason, *by_remote)
                    .await
            }
            Self::Error(error) => {
                handler.on_error(error).await;
                Ok(())
            }
        }
    }
}
