// WebSocket push channel
// One socket per session. A reader task decodes frames and fans them out to
// the registered listeners; emits go through the shared write half.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use reqwest::Url;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{
    encode_frame, ChannelError, EventKind, Listener, ListenerId, ListenerRegistry, PushChannel,
    PushEvent,
};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

pub struct WsPushChannel {
    registry: ListenerRegistry,
    connected: Arc<AtomicBool>,
    writer: TokioMutex<WsWriter>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsPushChannel {
    /// Build the socket URL for a REST base URL (`http` becomes `ws`, `https` becomes `wss`)
    pub fn socket_url(server_url: &str, user_id: &str) -> Result<Url, ChannelError> {
        let ws_base = if server_url.starts_with("https://") {
            server_url.replacen("https://", "wss://", 1)
        } else if server_url.starts_with("http://") {
            server_url.replacen("http://", "ws://", 1)
        } else {
            return Err(ChannelError::Connect(format!(
                "server URL must start with http:// or https://: {}",
                server_url
            )));
        };

        let mut url = Url::parse(&ws_base).map_err(|e| ChannelError::Connect(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ChannelError::Connect(format!("unusable server URL: {}", server_url)))?
            .pop_if_empty()
            .push("socket");
        url.query_pairs_mut().append_pair("userId", user_id);
        Ok(url)
    }

    /// Connect and start dispatching inbound events
    pub async fn connect(server_url: &str, user_id: &str) -> Result<Arc<Self>, ChannelError> {
        let url = Self::socket_url(server_url, user_id)?;
        info!("Connecting push channel to {}", url);

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (writer, mut reader) = stream.split();

        let registry = ListenerRegistry::new();
        let connected = Arc::new(AtomicBool::new(true));

        let task_registry = registry.clone();
        let task_connected = connected.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match PushEvent::from_frame(&text) {
                        Ok(Some(event)) => {
                            let delivered = task_registry.dispatch(&event);
                            debug!("Push event {:?} delivered to {} listener(s)", event.kind(), delivered);
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Dropping push frame: {}", e),
                    },
                    Ok(WsMessage::Close(_)) => {
                        info!("Push channel closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Push channel receive failed: {}", e);
                        break;
                    }
                }
            }
            task_connected.store(false, Ordering::SeqCst);
        });

        Ok(Arc::new(Self {
            registry,
            connected,
            writer: TokioMutex::new(writer),
            reader: Mutex::new(Some(handle)),
        }))
    }

    /// Close the socket and stop the reader task
    pub async fn disconnect(&self) -> Result<(), ChannelError> {
        self.connected.store(false, Ordering::SeqCst);
        let result = {
            let mut writer = self.writer.lock().await;
            writer
                .send(WsMessage::Close(None))
                .await
                .map_err(|e| ChannelError::Send(e.to_string()))
        };
        self.abort_reader();
        info!("Push channel disconnected");
        result
    }

    fn abort_reader(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for WsPushChannel {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
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
        let text = encode_frame(event, data)?;
        let mut writer = self.writer.lock().await;
        writer
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }
}
