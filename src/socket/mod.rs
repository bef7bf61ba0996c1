// Push channel client
// Wraps the server-initiated event stream (new messages, online users) behind
// a small listener registry so the chat store never sees raw frames.

use async_trait::async_trait;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Message;

pub mod memory;
pub mod ws;

pub use memory::MemoryChannel;
pub use ws::WsPushChannel;

/// Event names used on the wire
pub mod event_names {
    pub const NEW_MESSAGE: &str = "newMessage";
    pub const ONLINE_USERS: &str = "getOnlineUsers";
}

/// Errors raised by a push channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Push channel is not connected")]
    NotConnected,

    #[error("Failed to connect push channel: {0}")]
    Connect(String),

    #[error("Failed to send on push channel: {0}")]
    Send(String),

    #[error("Malformed push frame: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    OnlineUsers,
}

/// A decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NewMessage(Message),
    OnlineUsers(Vec<String>),
}

/// JSON envelope carried in every text frame
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl PushEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PushEvent::NewMessage(_) => EventKind::NewMessage,
            PushEvent::OnlineUsers(_) => EventKind::OnlineUsers,
        }
    }

    /// Decode a text frame. Events this client does not know about yield `Ok(None)`.
    pub fn from_frame(text: &str) -> Result<Option<PushEvent>, ChannelError> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|e| ChannelError::Decode(e.to_string()))?;

        let event = match frame.event.as_str() {
            event_names::NEW_MESSAGE => PushEvent::NewMessage(
                serde_json::from_value(frame.data)
                    .map_err(|e| ChannelError::Decode(format!("newMessage: {}", e)))?,
            ),
            event_names::ONLINE_USERS => PushEvent::OnlineUsers(
                serde_json::from_value(frame.data)
                    .map_err(|e| ChannelError::Decode(format!("getOnlineUsers: {}", e)))?,
            ),
            other => {
                debug!("Ignoring unknown push event '{}'", other);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Encode an outbound frame in the same envelope the server uses
pub fn encode_frame(event: &str, data: serde_json::Value) -> Result<String, ChannelError> {
    serde_json::to_string(&Frame {
        event: event.to_string(),
        data,
    })
    .map_err(|e| ChannelError::Send(e.to_string()))
}

pub type Listener = Arc<dyn Fn(&PushEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        ListenerId(Uuid::new_v4())
    }
}

/// Bidirectional push channel to a single remote endpoint
#[async_trait]
pub trait PushChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Register a listener for one kind of event
    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId;

    /// Remove a listener. Returns false if it was not registered.
    fn off(&self, id: ListenerId) -> bool;

    fn listener_count(&self, kind: EventKind) -> usize;

    async fn emit(&self, event: &str, data: serde_json::Value) -> Result<(), ChannelError>;
}

/// Listener bookkeeping shared by the channel implementations.
///
/// Listeners are invoked in registration order, outside the registry lock,
/// so a listener may call `off` on its own channel.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<Mutex<Vec<(ListenerId, EventKind, Listener)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push((id, kind, listener)),
            Err(poisoned) => {
                error!("Listener registry lock poisoned, recovering");
                poisoned.into_inner().push((id, kind, listener));
            }
        }
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    /// Deliver an event, returning how many listeners saw it
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind())
            .map(|(_, _, listener)| listener.clone())
            .collect();

        for listener in &targets {
            listener(event);
        }
        targets.len()
    }
}
