//! WebSocket connection to the message bus
//!
//! Text frames only: binary frames are ignored on the way in. After the
//! handshake the connection may send a list of plain-text control frames
//! (a Ditto endpoint needs `START-SEND-MESSAGES` and
//! `START-SEND-LIVE-COMMANDS` before it pushes anything).

use crate::connection::{Connection, InboundFrames, InboundSlot};
use crate::{ConnectionError, Result};
use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket connection
pub struct WebSocketConnection {
    url: String,
    name: String,
    connect_timeout: Duration,
    handshake_frames: Vec<String>,
    sink: Mutex<Option<WsSink>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    inbound: InboundSlot,
    connected: Arc<AtomicBool>,
}

impl WebSocketConnection {
    /// Create a connection for a `ws://` or `wss://` URL. Nothing is
    /// dialled until `start()`.
    pub fn new(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ConnectionError::invalid_url(url, e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ConnectionError::invalid_url(
                url,
                "WebSocket URL must start with ws:// or wss://",
            ));
        }

        let name = format!("ws-{}{}", parsed.host_str().unwrap_or("unknown"), parsed.path());

        Ok(Self {
            url: url.to_string(),
            name: name.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_frames: Vec::new(),
            sink: Mutex::new(None),
            reader: parking_lot::Mutex::new(None),
            inbound: InboundSlot::new(name),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Control frames sent right after the handshake
    pub fn with_handshake_frames(mut self, frames: Vec<String>) -> Self {
        self.handshake_frames = frames;
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the socket is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect_websocket(&self) -> Result<WsStream> {
        use tokio_tungstenite::{connect_async, tungstenite::Error as WsError};

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    ConnectionError::timeout(
                        format!("connect {}", self.url),
                        self.connect_timeout.as_millis() as u64,
                    )
                })?
                .map_err(|e| match e {
                    WsError::Io(io_err) => ConnectionError::from(io_err),
                    other => ConnectionError::handshake_with_source(
                        &self.url,
                        "WebSocket handshake failed",
                        other,
                    ),
                })?;

        Ok(ws_stream)
    }
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn start(&self) -> Result<()> {
        let mut sink_guard = self.sink.lock().await;
        if sink_guard.is_some() {
            return Ok(());
        }

        debug!(url = %self.url, "Connecting WebSocket");
        let ws_stream = self.connect_websocket().await?;
        let (mut sink, mut stream) = ws_stream.split();

        for frame in &self.handshake_frames {
            sink.send(WsMessage::Text(frame.clone()))
                .await
                .map_err(|e| ConnectionError::handshake(&self.url, e.to_string()))?;
        }

        let inbound = self.inbound.sender();
        let connected = Arc::clone(&self.connected);
        let url = self.url.clone();
        let reader = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(WsMessage::Text(text)) => {
                        if inbound.send(text).is_err() {
                            debug!(url = %url, "Inbound subscriber dropped, stopping reader");
                            break;
                        }
                    }
                    Ok(WsMessage::Binary(data)) => {
                        trace!(url = %url, bytes = data.len(), "Ignoring binary frame");
                    }
                    Ok(WsMessage::Close(frame)) => {
                        match frame {
                            Some(frame) => info!(
                                url = %url,
                                code = %frame.code,
                                reason = %frame.reason,
                                "Connection closed by peer"
                            ),
                            None => info!(url = %url, "Connection closed by peer"),
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(url = %url, error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::Relaxed);
        });

        *sink_guard = Some(sink);
        *self.reader.lock() = Some(reader);
        self.connected.store(true, Ordering::Relaxed);
        info!(url = %self.url, "Successfully connected");
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| ConnectionError::closed(&self.name))?;

        sink.send(WsMessage::Text(frame)).await.map_err(|e| {
            self.connected.store(false, Ordering::Relaxed);
            ConnectionError::send_with_source(format!("WebSocket write to {} failed", self.url), e)
        })
    }

    async fn close(&self) -> Result<()> {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.send(WsMessage::Close(None)).await {
                debug!(url = %self.url, error = %e, "Close frame not delivered");
            }
            let _ = sink.close().await;
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self) -> Result<InboundFrames> {
        self.inbound.take()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
