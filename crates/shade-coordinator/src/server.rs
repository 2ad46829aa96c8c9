use crate::coordinator::Coordinator;
use futures::{SinkExt, StreamExt};
use shade_common::{AgentRequest, AgentResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loopback WebSocket endpoint for page agents.
pub struct CoordinatorServer {
    coordinator: Arc<Coordinator>,
    port: u16,
}

pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address; the real port when started with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops accepting, closes open connections and waits for the accept
    /// loop to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("Server accept loop failed: {}", e);
        }
    }
}

impl CoordinatorServer {
    pub fn new(coordinator: Arc<Coordinator>, port: u16) -> Self {
        Self { coordinator, port }
    }

    pub async fn start(&self) -> Result<ServerHandle, ServerError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!("Coordinator listening on: {}", local_addr);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            self.coordinator.clone(),
            shutdown.clone(),
        ));

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
) {
    debug!("Server accept loop started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted TCP connection from: {}", peer);
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        coordinator.clone(),
                        shutdown.child_token(),
                    ));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                }
            },
        }
    }
    info!("Coordinator stopped accepting connections");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Error during the websocket handshake with {}: {}", peer, e);
            return;
        }
    };

    debug!("Agent connected from {}", peer);
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }

            msg = ws_receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Agent {} disconnected", peer);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", peer, e);
                        break;
                    }
                };

                let response = match serde_json::from_str::<AgentRequest>(&text) {
                    Ok(request) => coordinator.handle(request).await,
                    Err(e) => {
                        warn!("Unparseable agent request from {}: {}", peer, e);
                        AgentResponse::failed(format!("malformed request: {}", e))
                    }
                };

                let json = match serde_json::to_string(&response) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode response: {}", e);
                        break;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    warn!("Failed to send response to {}: {}", peer, e);
                    break;
                }
            }
        }
    }
}
