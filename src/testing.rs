//! In-memory stand-ins for the transport, the platform and observers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    common::{
        errors::{LavaError, Result},
        types::{AnyResult, ChannelId, GuildId, UserId},
    },
    events::EventHandler,
    player::Player,
    protocol::{
        Cpu, Memory, OutgoingMessage, ServerStats, TrackEndReason, TrackException, tracks::Track,
    },
    transport::Transport,
    voice::PlatformGateway,
};

pub const BOT_USER: UserId = UserId(1000);

/// Records every outbound message instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport whose sends all fail without recording anything.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(OutgoingMessage::op).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.sent.lock().iter().filter(|m| m.op() == op).count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        if self.fail {
            return Err(LavaError::Transport("connection refused".into()));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Platform double that remembers the voice channels it was asked to join.
/// Rejected requests are not remembered.
pub struct FakeGateway {
    pub requests: Mutex<Vec<(GuildId, Option<ChannelId>)>>,
    fail: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(GuildId, Option<ChannelId>)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PlatformGateway for FakeGateway {
    fn current_user_id(&self) -> UserId {
        BOT_USER
    }

    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel: Option<ChannelId>,
        _self_mute: bool,
        _self_deaf: bool,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LavaError::Transport("gateway unavailable".into()));
        }
        self.requests.lock().push((guild_id, channel));
        Ok(())
    }
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
enum Seen {
    Position(GuildId, u64),
    Finished(GuildId, Option<String>, TrackEndReason),
    Error(String),
    Other,
}

/// Observer that writes `name:event` lines to a log and keeps the payloads
/// tests care about.
pub struct RecordingHandler {
    name: &'static str,
    log: EventLog,
    seen: Mutex<Vec<(&'static str, Seen)>>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::with_log("recorder", &Self::shared_log())
    }

    pub fn shared_log() -> EventLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn with_log(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: log.clone(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, event: &'static str, seen: Seen) {
        self.log.lock().push(format!("{}:{}", self.name, event));
        self.seen.lock().push((event, seen));
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.seen.lock().iter().map(|(event, _)| *event).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.seen.lock().iter().filter(|(e, _)| *e == event).count()
    }

    pub fn positions(&self, guild: GuildId) -> Vec<u64> {
        self.seen
            .lock()
            .iter()
            .filter_map(|(_, seen)| match seen {
                Seen::Position(g, ms) if *g == guild => Some(*ms),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<(GuildId, Option<String>, TrackEndReason)> {
        self.seen
            .lock()
            .iter()
            .filter_map(|(_, seen)| match seen {
                Seen::Finished(g, label, reason) => Some((*g, label.clone(), *reason)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|(_, seen)| match seen {
                Seen::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn stats_received(&self, _stats: &ServerStats) -> AnyResult<()> {
        self.record("stats_received", Seen::Other);
        Ok(())
    }

    async fn player_updated(
        &self,
        player: &Arc<Player>,
        _track: Option<&Track>,
        position: Duration,
    ) -> AnyResult<()> {
        let seen = Seen::Position(player.guild_id(), position.as_millis() as u64);
        self.record("player_updated", seen);
        Ok(())
    }

    async fn track_started(&self, _player: &Arc<Player>, _track: Option<&Track>) -> AnyResult<()> {
        self.record("track_started", Seen::Other);
        Ok(())
    }

    async fn track_finished(
        &self,
        player: &Arc<Player>,
        track: Option<&Track>,
        reason: TrackEndReason,
    ) -> AnyResult<()> {
        let label = track.map(|t| t.label().to_string());
        self.record(
            "track_finished",
            Seen::Finished(player.guild_id(), label, reason),
        );
        Ok(())
    }

    async fn track_exception(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _exception: &TrackException,
    ) -> AnyResult<()> {
        self.record("track_exception", Seen::Other);
        Ok(())
    }

    async fn track_stuck(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _threshold_ms: u64,
    ) -> AnyResult<()> {
        self.record("track_stuck", Seen::Other);
        Ok(())
    }

    async fn websocket_closed(
        &self,
        _player: &Arc<Player>,
        _code: u16,
        _reason: &str,
        _by_remote: bool,
    ) -> AnyResult<()> {
        self.record("websocket_closed", Seen::Other);
        Ok(())
    }

    async fn on_error(&self, error: &LavaError) {
        self.record("on_error", Seen::Error(error.to_string()));
    }
}

/// Observer that blows up whenever a track finishes.
pub struct PanickingHandler;

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn track_finished(
        &self,
        _player: &Arc<Player>,
        _track: Option<&Track>,
        _reason: TrackEndReason,
    ) -> AnyResult<()> {
        panic!("handler exploded");
    }
}

pub fn sample_stats() -> ServerStats {
    ServerStats {
        players: 2,
        playing_players: 1,
        uptime: 60_000,
        memory: Memory {
            free: 100,
            used: 200,
            allocated: 300,
            reservable: 400,
        },
        cpu: Cpu {
            cores: 4,
            system_load: 0.25,
            lavalink_load: 0.05,
        },
        frame_stats: None,
    }
}
