use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::{
    common::{errors::LavaError, types::GuildId},
    events::{ClientEvent, EventHandler},
};

type Handlers = RwLock<Vec<Arc<dyn EventHandler>>>;

enum LaneMessage {
    Event(ClientEvent),
    Flush(oneshot::Sender<()>),
}

/// Fans client events out to subscribed handlers.
///
/// Each guild gets its own lane (a channel drained by a spawned task), plus
/// one global lane for stats and errors. Emitting never waits for handlers:
/// a slow handler delays later events of the same guild only.
pub struct EventHub {
    handlers: Arc<Handlers>,
    lanes: DashMap<Option<GuildId>, flume::Sender<LaneMessage>>,
    /// Closed lanes still delivering what was queued before the close.
    draining: Mutex<Vec<oneshot::Receiver<()>>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            lanes: DashMap::new(),
            draining: Mutex::new(Vec::new()),
        }
    }

    /// Adds a handler after the existing ones.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Queues `event` on its lane. Must be called inside a Tokio runtime.
    ///
    /// Events about a destroyed player are dropped; its lane is gone.
    pub fn emit(&self, event: ClientEvent) {
        let key = event.guild_id();
        if self.handlers.read().is_empty() {
            trace!("no handlers for {}", event.name());
            return;
        }
        if event.player().is_some_and(|p| p.is_destroyed()) {
            trace!("dropping {} for destroyed player {:?}", event.name(), key);
            return;
        }

        let sender = self.lane(key);
        if sender.send(LaneMessage::Event(event)).is_err() {
            warn!("event lane {:?} is gone; event dropped", key);
        }
    }

    /// Reports an error to every handler's `on_error`.
    pub fn report(&self, error: LavaError) {
        self.emit(ClientEvent::Error(error));
    }

    /// Drops the guild's lane once its queued events are delivered.
    /// [`EventHub::flush`] still waits for those events.
    pub fn close_lane(&self, guild_id: GuildId) {
        let Some((_, sender)) = self.lanes.remove(&Some(guild_id)) else {
            return;
        };

        let (tx, rx) = oneshot::channel();
        if sender.send(LaneMessage::Flush(tx)).is_ok() {
            self.draining.lock().push(rx);
        }
    }

    /// Waits until everything queued so far has been delivered, including
    /// events left on lanes closed in the meantime.
    pub async fn flush(&self) {
        let senders: Vec<_> = self.lanes.iter().map(|l| l.value().clone()).collect();

        let mut waiting = std::mem::take(&mut *self.draining.lock());
        for sender in senders {
            let (tx, rx) = oneshot::channel();
            if sender.send(LaneMessage::Flush(tx)).is_ok() {
                waiting.push(rx);
            }
        }
        for rx in waiting {
            let _ = rx.await;
        }
    }

    fn lane(&self, key: Option<GuildId>) -> flume::Sender<LaneMessage> {
        self.lanes
            .entry(key)
            .or_insert_with(|| {
                let (tx, rx) = flume::unbounded();
                tokio::spawn(run_lane(key, rx, self.handlers.clone()));
                tx
            })
            .value()
            .clone()
    }
}

async fn run_lane(key: Option<GuildId>, rx: flume::Receiver<LaneMessage>, handlers: Arc<Handlers>) {
    while let Ok(message) = rx.recv_async().await {
        match message {
            LaneMessage::Event(event) => dispatch(&handlers, &event).await,
            LaneMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    trace!("event lane {:?} closed", key);
}

async fn dispatch(handlers: &Handlers, event: &ClientEvent) {
    let snapshot: Vec<Arc<dyn EventHandler>> = handlers.read().clone();

    let mut failures = Vec::new();
    for handler in &snapshot {
        if let Err(message) = run_isolated(event, handler.as_ref()).await {
            warn!("event handler failed in {}: {}", event.name(), message);
            failures.push(message);
        }
    }

    // A failing on_error is only logged.
    if matches!(event, ClientEvent::Error(_)) {
        return;
    }

    for message in failures {
        let error = ClientEvent::Error(LavaError::Handler {
            event: event.name(),
            message,
        });
        for handler in &snapshot {
            let _ = run_isolated(&error, handler.as_ref()).await;
        }
    }
}

async fn run_isolated(event: &ClientEvent, handler: &dyn EventHandler) -> Result<(), String> {
    match AssertUnwindSafe(event.deliver(handler)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
