// In-process push channel
// Used when no server socket is wanted (one-shot CLI commands) and by tests
// that need to inject server pushes deterministically.

use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{ChannelError, EventKind, Listener, ListenerId, ListenerRegistry, PushChannel, PushEvent};

pub struct MemoryChannel {
    registry: ListenerRegistry,
    connected: AtomicBool,
    emitted: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            registry: ListenerRegistry::new(),
            connected: AtomicBool::new(true),
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// A channel that reports itself as not connected
    pub fn disconnected() -> Self {
        let channel = Self::new();
        channel.set_connected(false);
        channel
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Act as the server and push an event to the registered listeners
    pub fn deliver(&self, event: PushEvent) -> usize {
        let delivered = self.registry.dispatch(&event);
        debug!("Delivered {:?} event to {} listener(s)", event.kind(), delivered);
        delivered
    }

    /// Everything emitted so far, oldest first
    pub fn emitted(&self) -> Vec<(String, serde_json::Value)> {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushChannel for MemoryChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.registry.add(kind, listener)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.registry.remove(id)
    }

    fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.count(kind)
    }

    async fn emit(&self, event: &str, data: serde_json::Value) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((event.to_string(), data));
        Ok(())
    }
}
