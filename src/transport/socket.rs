use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    handshake::client::Request,
    http::HeaderValue,
    protocol::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    common::{
        errors::{LavaError, Result},
        types::UserId,
    },
    configs::NodeConfig,
    protocol::OutgoingMessage,
    transport::{
        MessageSink, Transport,
        backoff::Backoff,
        constants::{NUM_SHARDS, WRITE_TASK_SHUTDOWN_MS},
    },
};

type Outbound = Arc<RwLock<Option<mpsc::UnboundedSender<Message>>>>;

enum SessionOutcome {
    Shutdown,
    Reconnect,
}

/// Websocket connection to the node.
///
/// A background task owns the socket: it connects, forwards every inbound
/// text frame to the sink and reconnects with exponential backoff. Sends made
/// while disconnected fail with [`LavaError::Transport`]; nothing is queued
/// for later.
pub struct SocketTransport {
    outbound: Outbound,
    cancel_token: CancellationToken,
}

impl SocketTransport {
    /// Starts the connection task. Must be called inside a Tokio runtime.
    pub fn spawn(config: NodeConfig, user_id: UserId, sink: MessageSink) -> Arc<Self> {
        let transport = Self::idle();
        let supervisor = Supervisor {
            config,
            user_id,
            sink,
            outbound: transport.outbound.clone(),
            cancel_token: transport.cancel_token.clone(),
        };
        tokio::spawn(supervisor.run());
        Arc::new(transport)
    }

    fn idle() -> Self {
        Self {
            outbound: Arc::new(RwLock::new(None)),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.read().is_some()
    }

    /// Closes the socket and stops reconnecting.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let json = message.to_json()?;
        let Some(tx) = self.outbound.read().clone() else {
            return Err(LavaError::Transport("not connected to node".into()));
        };

        trace!("-> {}", json);
        tx.send(Message::Text(json.into()))
            .map_err(|_| LavaError::Transport("node connection closed".into()))
    }
}

/// Builds the upgrade request with the node's auth headers.
pub fn handshake_request(config: &NodeConfig, user_id: UserId) -> Result<Request> {
    let mut request = config.socket_url().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Authorization", header_value(&config.password)?);
    headers.insert("User-Id", HeaderValue::from(user_id.0));
    headers.insert("Client-Name", header_value(&config.client_name)?);
    headers.insert("Num-Shards", HeaderValue::from(NUM_SHARDS));
    Ok(request)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| LavaError::Transport(format!("invalid handshake header: {}", e)))
}

struct Supervisor {
    config: NodeConfig,
    user_id: UserId,
    sink: MessageSink,
    outbound: Outbound,
    cancel_token: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        let mut backoff = Backoff::new(&self.config.reconnect);

        loop {
            if self.cancel_token.is_cancelled() {
                return;
            }

            match self.connect(&mut backoff).await {
                Ok(SessionOutcome::Shutdown) => {
                    debug!("node connection shutting down cleanly");
                    return;
                }
                Ok(SessionOutcome::Reconnect) => {
                    if backoff.is_exhausted() {
                        warn!("max reconnect attempts reached; giving up on node");
                        return;
                    }
                }
                Err(e) => {
                    if backoff.is_exhausted() {
                        error!(
                            "node connection failed after {} attempts: {}",
                            backoff.attempts(),
                            e
                        );
                        return;
                    }
                    warn!("node connection error: {}", e);
                }
            }

            let delay = backoff.next();
            debug!("reconnecting to node in {:?}", delay);
            tokio::select! {
                _ = self.cancel_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(&self, backoff: &mut Backoff) -> Result<SessionOutcome> {
        let request = handshake_request(&self.config, self.user_id)?;
        debug!("connecting to node: {}", self.config.socket_url());

        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!("connected to node at {}", self.config.socket_url());
        backoff.reset();

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.write() = Some(tx.clone());

        let session_token = self.cancel_token.child_token();
        let writer_token = session_token.clone();
        let write_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_token.cancelled() => break,
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            warn!("node write error: {}", e);
                            break;
                        }
                    }
                }
            }
            let _ = write.close().await;
        });

        let outcome = loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break SessionOutcome::Shutdown,
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("node read error: {}", e);
                            break SessionOutcome::Reconnect;
                        }
                        None => {
                            debug!("node stream ended");
                            break SessionOutcome::Reconnect;
                        }
                    };

                    match msg {
                        Message::Text(text) => {
                            trace!("<- {}", text);
                            if self.sink.send(text.to_string()).is_err() {
                                debug!("message sink dropped; closing node connection");
                                break SessionOutcome::Shutdown;
                            }
                        }
                        Message::Close(frame) => {
                            let (code, reason) = frame
                                .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                                .unwrap_or((1000, "No reason".into()));
                            info!("node closed the connection: code={}, reason='{}'", code, reason);
                            break SessionOutcome::Reconnect;
                        }
                        _ => {}
                    }
                }
            }
        };

        *self.outbound.write() = None;
        session_token.cancel();
        drop(tx);
        let _ = tokio::time::timeout(Duration::from_millis(WRITE_TASK_SHUTDOWN_MS), write_task).await;

        Ok(outcome)
    }
}
