use async_trait::async_trait;

use crate::{common::errors::Result, protocol::OutgoingMessage};

pub mod backoff;
pub mod constants;
pub mod socket;

pub use socket::SocketTransport;

/// Receives every inbound text frame from the node, in arrival order.
pub type MessageSink = flume::Sender<String>;

/// Outbound half of the node connection.
///
/// Implementations hand the message off and return; they never wait for the
/// node to act on it. Inbound frames are delivered separately through a
/// [`MessageSink`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<()>;
}
