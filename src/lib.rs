//! Per-guild player control for a Lavalink-style audio node.
//!
//! [`LavaClient`] keeps one [`Player`] per guild, forwards the platform's
//! voice credentials to the node, and turns the node's websocket messages
//! into player transitions and [`EventHandler`] callbacks.

pub mod client;
pub mod common;
pub mod configs;
pub mod events;
pub mod player;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod voice;

#[cfg(test)]
mod testing;

pub use client::LavaClient;
pub use common::errors::{LavaError, Result};
pub use common::types::{ChannelId, GuildId, UserId};
pub use configs::Config;
pub use events::{ClientEvent, EventHandler};
pub use player::{PlayOptions, Player, PlayerSnapshot, PlayerStatus};
pub use protocol::{ServerStats, Track, TrackEndReason, TrackException};
pub use transport::{SocketTransport, Transport};
pub use voice::{PlatformGateway, VoiceServerUpdate, VoiceState};
