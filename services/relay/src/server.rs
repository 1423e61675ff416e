//! Relay server
//!
//! One task per client. Inbound text frames are handed to the [`Hub`],
//! which routes them by `to`; a writer task drains the client's outbound
//! channel into its socket.

use crate::path::client_identity;
use actor_config::RelayConfig;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use network::{ConnectionError, Delivery, Hub};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

pub struct RelayServer {
    config: RelayConfig,
    hub: Arc<Hub>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            hub: Arc::new(Hub::new()),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind relay on {addr}"))
    }

    /// Accept clients until the listener fails
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!(address = %local, "Relay listening");

        loop {
            let (stream, peer) = listener.accept().await.context("Accept failed")?;
            let hub = Arc::clone(&self.hub);
            let max_frame_bytes = self.config.max_frame_bytes;
            tokio::spawn(async move {
                if let Err(e) = handle_client(stream, peer, hub, max_frame_bytes).await {
                    warn!(peer = %peer, error = %e, "Client connection failed");
                }
            });
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    max_frame_bytes: usize,
) -> Result<()> {
    let mut identity = None;
    let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        match client_identity(request.uri().path()) {
            Some(id) => {
                identity = Some(id);
                Ok(response)
            }
            None => {
                let mut rejection = ErrorResponse::new(Some(format!(
                    "Expected /ws/{{namespace}}/{{name}}, got {}",
                    request.uri().path()
                )));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .context("WebSocket handshake failed")?;
    let Some(identity) = identity else {
        anyhow::bail!("Handshake completed without a client identity");
    };

    let (mut sink, mut source) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    hub.attach(identity.clone(), tx.clone());
    info!(client = %identity, peer = %peer, "Client connected");

    let writer_id = identity.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!(client = %writer_id, error = %e, "Write failed, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if text.len() > max_frame_bytes {
                    warn!(
                        client = %identity,
                        bytes = text.len(),
                        limit = max_frame_bytes,
                        "Dropping oversized frame"
                    );
                    continue;
                }
                match hub.forward(&text) {
                    Ok(Delivery::Delivered { to }) => trace!(from = %identity, to = %to, "Forwarded"),
                    Ok(Delivery::DeadLetter { .. }) => {}
                    Err(ConnectionError::Unroutable(reason)) => {
                        warn!(client = %identity, reason = %reason, "Dropping frame without a destination")
                    }
                    Err(e) => warn!(client = %identity, error = %e, "Forward failed"),
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(client = %identity, reason = ?frame, "Client sent close");
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(client = %identity, "Ignoring binary frame");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(client = %identity, error = %e, "WebSocket error");
                break;
            }
        }
    }

    hub.detach(&identity, &tx);
    writer.abort();
    info!(client = %identity, "Client disconnected");
    Ok(())
}
