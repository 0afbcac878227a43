use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    common::{
        errors::{LavaError, Result},
        types::{ChannelId, GuildId},
    },
    player::state::{PlayOptions, PlayerSnapshot, PlayerStatus},
    protocol::{OutgoingMessage, PlayerUpdateState, TrackEndReason, tracks::Track},
    transport::Transport,
};

/// Upper bound the node accepts for `volume`.
pub const MAX_VOLUME: u16 = 1000;

struct PlayerInner {
    status: PlayerStatus,
    voice_channel: ChannelId,
    text_channel: Option<ChannelId>,
    track: Option<Track>,
    position: u64,
    last_update: Option<u64>,
    volume: u16,
    connected: bool,
    ping: i64,
}

/// Per-guild player.
///
/// Every transition takes the player's lock and keeps it until the matching
/// payload has been handed to the transport, so operations on one guild
/// apply in order while other guilds run independently.
///
/// Caller-initiated operations report [`LavaError::InvalidState`] from an
/// incompatible state and [`LavaError::AlreadyDestroyed`] after disposal;
/// neither mutates anything. Node-driven updates on a destroyed player are
/// ignored.
pub struct Player {
    guild_id: GuildId,
    transport: Arc<dyn Transport>,
    destroyed: AtomicBool,
    inner: Mutex<PlayerInner>,
}

impl Player {
    pub fn new(
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
        volume: u16,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            guild_id,
            transport,
            destroyed: AtomicBool::new(false),
            inner: Mutex::new(PlayerInner {
                status: PlayerStatus::Idle,
                voice_channel,
                text_channel,
                track: None,
                position: 0,
                last_update: None,
                volume: volume.min(MAX_VOLUME),
                connected: false,
                ping: -1,
            }),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Lock-free check used by the registry.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> PlayerStatus {
        self.inner.lock().await.status
    }

    pub async fn track(&self) -> Option<Track> {
        self.inner.lock().await.track.clone()
    }

    pub async fn voice_channel(&self) -> ChannelId {
        self.inner.lock().await.voice_channel
    }

    pub async fn text_channel(&self) -> Option<ChannelId> {
        self.inner.lock().await.text_channel
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.inner.lock().await;
        PlayerSnapshot {
            guild_id: self.guild_id,
            voice_channel: inner.voice_channel,
            text_channel: inner.text_channel,
            status: inner.status,
            track: inner.track.clone(),
            position: inner.position,
            last_update: inner.last_update,
            volume: inner.volume,
            connected: inner.connected,
            ping: inner.ping,
        }
    }

    pub async fn play(&self, track: Track) -> Result<()> {
        self.play_with(track, PlayOptions::default()).await
    }

    /// Starts `track`. Valid from idle, playing and paused; the player waits
    /// in `Loading` until the node reports the track started.
    pub async fn play_with(&self, track: Track, options: PlayOptions) -> Result<()> {
        let mut inner = self.live("play").await?;
        self.require(&inner, "play", PlayerStatus::can_play)?;

        let message = OutgoingMessage::Play {
            guild_id: self.guild_id,
            track: track.encoded.clone(),
            start_time: options.start_time,
            end_time: options.end_time,
            no_replace: options.no_replace,
        };

        // With no_replace the node keeps what is already playing.
        let keeps_current = options.no_replace && inner.track.is_some();
        if !keeps_current {
            debug!("[{}] play '{}'", self.guild_id, track.label());
            inner.status = PlayerStatus::Loading;
            inner.position = options.start_time.unwrap_or(0);
            inner.track = Some(track);
        }

        self.send(message).await
    }

    /// Stops the current track. Valid while loading, playing or paused.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.live("stop").await?;
        self.require(&inner, "stop", PlayerStatus::has_track)?;

        inner.status = PlayerStatus::Idle;
        inner.track = None;
        inner.position = 0;

        self.send(OutgoingMessage::Stop {
            guild_id: self.guild_id,
        })
        .await
    }

    pub async fn pause(&self) -> Result<()> {
        let mut inner = self.live("pause").await?;
        self.require(&inner, "pause", |s| s == PlayerStatus::Playing)?;

        inner.status = PlayerStatus::Paused;

        self.send(OutgoingMessage::Pause {
            guild_id: self.guild_id,
            pause: true,
        })
        .await
    }

    pub async fn resume(&self) -> Result<()> {
        let mut inner = self.live("resume").await?;
        self.require(&inner, "resume", |s| s == PlayerStatus::Paused)?;

        inner.status = PlayerStatus::Playing;

        self.send(OutgoingMessage::Pause {
            guild_id: self.guild_id,
            pause: false,
        })
        .await
    }

    /// Seeks within the current track. Valid while playing or paused.
    pub async fn seek(&self, position: u64) -> Result<()> {
        let mut inner = self.live("seek").await?;
        self.require(&inner, "seek", |s| {
            matches!(s, PlayerStatus::Playing | PlayerStatus::Paused)
        })?;

        inner.position = position;

        self.send(OutgoingMessage::Seek {
            guild_id: self.guild_id,
            position,
        })
        .await
    }

    /// Sets the volume, clamped to `0..=1000`. Valid in any live state.
    pub async fn set_volume(&self, volume: u16) -> Result<()> {
        let mut inner = self.live("set volume").await?;

        let volume = volume.min(MAX_VOLUME);
        inner.volume = volume;

        self.send(OutgoingMessage::Volume {
            guild_id: self.guild_id,
            volume,
        })
        .await
    }

    /// Applies a node position report. Reports whose timestamp is not newer
    /// than the last applied one are discarded. Returns whether it applied.
    pub async fn update_position(&self, position: u64, time: u64) -> bool {
        self.update_state(&PlayerUpdateState {
            time,
            position,
            connected: None,
            ping: None,
        })
        .await
    }

    /// Like [`Self::update_position`], also taking the connection flag and
    /// ping when the node sends them.
    pub async fn update_state(&self, state: &PlayerUpdateState) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.status.is_live() {
            return false;
        }
        if inner.last_update.is_some_and(|last| state.time <= last) {
            debug!(
                "[{}] discarding stale position update (t={} <= {:?})",
                self.guild_id, state.time, inner.last_update
            );
            return false;
        }

        inner.position = state.position;
        inner.last_update = Some(state.time);
        if let Some(connected) = state.connected {
            inner.connected = connected;
        }
        if let Some(ping) = state.ping {
            inner.ping = ping;
        }
        true
    }

    /// Node acknowledged a `play`: `Loading` becomes `Playing`.
    ///
    /// A start for some other track (a stale one) leaves the state alone.
    pub async fn mark_started(&self, track: Option<&Track>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.status != PlayerStatus::Loading || !refers_to_current(&inner, track) {
            return false;
        }
        inner.status = PlayerStatus::Playing;
        true
    }

    /// Node reported the track ended, failed or got stuck.
    ///
    /// Clears the current track and drops to `Idle` when the event is about
    /// the current track. A `Replaced` end is the node reporting the track a
    /// newer `play` superseded, so it never clears anything. Returns the
    /// cleared track, if any.
    pub async fn clear_track(
        &self,
        track: Option<&Track>,
        reason: Option<TrackEndReason>,
    ) -> Option<Track> {
        let mut inner = self.inner.lock().await;
        if !inner.status.has_track()
            || reason == Some(TrackEndReason::Replaced)
            || !refers_to_current(&inner, track)
        {
            return None;
        }

        inner.status = PlayerStatus::Idle;
        inner.position = 0;
        inner.track.take()
    }

    /// The bot moved to another voice channel in the same guild.
    pub async fn set_voice_channel(&self, channel: ChannelId) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_live() {
            inner.voice_channel = channel;
        }
    }

    pub async fn set_text_channel(&self, channel: Option<ChannelId>) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_live() {
            inner.text_channel = channel;
        }
    }

    /// Tears the player down on the node. Only the first call sends
    /// `destroy`; later calls return `Ok` without doing anything.
    pub async fn dispose(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.status.is_live() {
            return Ok(());
        }

        inner.status = PlayerStatus::Destroyed;
        inner.track = None;
        self.destroyed.store(true, Ordering::Release);
        debug!("[{}] player destroyed", self.guild_id);

        self.send(OutgoingMessage::Destroy {
            guild_id: self.guild_id,
        })
        .await
    }

    async fn live(&self, operation: &'static str) -> Result<MutexGuard<'_, PlayerInner>> {
        let inner = self.inner.lock().await;
        if !inner.status.is_live() {
            debug!("[{}] {} on destroyed player", self.guild_id, operation);
            return Err(LavaError::AlreadyDestroyed(self.guild_id));
        }
        Ok(inner)
    }

    fn require(
        &self,
        inner: &PlayerInner,
        operation: &'static str,
        allowed: impl Fn(PlayerStatus) -> bool,
    ) -> Result<()> {
        if allowed(inner.status) {
            Ok(())
        } else {
            Err(LavaError::InvalidState {
                guild: self.guild_id,
                operation,
                state: inner.status,
            })
        }
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let op = message.op();
        self.transport.send(&message).await.inspect_err(|e| {
            warn!("[{}] failed to send {}: {}", self.guild_id, op, e);
        })
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

fn refers_to_current(inner: &PlayerInner, track: Option<&Track>) -> bool {
    match (track, inner.track.as_ref()) {
        (None, _) => true,
        (Some(event), Some(current)) => event.encoded == current.encoded,
        (Some(_), None) => false,
    }
}
