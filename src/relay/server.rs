use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::relay::{Connection, ConnectionRegistry};

// Outbound queue depth per connection. A peer that stops reading fills
// its own queue and starts losing records; it never blocks the router.
const OUTBOUND_BUFFER: usize = 256;

/// Owns the connection registry and accepts relay clients. One instance
/// per process, created in `main` and shared via `Arc` — the registry
/// is lifecycle-scoped to this server, never a global.
pub struct RelayServer {
    registry: Arc<ConnectionRegistry>,
}

impl RelayServer {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Accept loop: one spawned handler per inbound TCP connection.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    pub async fn handle_connection(self: Arc<Self>, raw_stream: TcpStream, addr: SocketAddr) {
        info!("New WebSocket connection from: {}", addr);

        let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during WebSocket handshake: {}", e);
                return;
            }
        };

        let (ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);

        let mut connection = Connection::new(tx, self.registry.clone());
        let connection_id = connection.id();

        // Drain the outbound queue into the socket. The task ends once
        // every sender clone is gone or the sink fails.
        tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut rx = rx;

            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending WebSocket message: {}", e);
                    break;
                }
            }

            if let Err(e) = ws_sink.close().await {
                debug!("Error closing WebSocket connection: {}", e);
            }
        });

        // One record at a time, handled to completion, per connection
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(Message::Close(_)) => {
                    info!("Client initiated close for connection {}", connection_id);
                    break;
                }
                Ok(msg) => connection.handle_frame(msg).await,
                Err(e) => {
                    warn!("Error receiving WebSocket message: {}", e);
                    break;
                }
            }
        }

        connection.close().await;
        info!("Connection {} closed", connection_id);
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}
