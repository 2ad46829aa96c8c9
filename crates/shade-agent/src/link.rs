//! Delivery of detected logins to the local coordinator.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shade_common::{AgentRequest, AgentResponse, LoginDetected};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Coordinator connection lost")]
    ConnectionLost,
    #[error("Coordinator rejected the event: {0}")]
    Rejected(String),
    #[error("Unexpected response from coordinator")]
    UnexpectedResponse,
}

/// Where verified logins go once the outcome check passes.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn login_detected(&self, login: LoginDetected) -> Result<(), LinkError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for the coordinator. Connects on first use and again
/// after any transport error.
pub struct CoordinatorLink {
    url: String,
    stream: Mutex<Option<WsStream>>,
}

impl CoordinatorLink {
    pub fn new(port: u16) -> Self {
        Self::with_url(format!("ws://127.0.0.1:{}", port))
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: Mutex::new(None),
        }
    }

    pub async fn device_id(&self) -> Result<String, LinkError> {
        match self.request(&AgentRequest::GetDeviceId).await? {
            AgentResponse::DeviceId { device_id } => Ok(device_id),
            AgentResponse::Ack {
                error: Some(error), ..
            } => Err(LinkError::Rejected(error)),
            AgentResponse::Ack { .. } => Err(LinkError::UnexpectedResponse),
        }
    }

    async fn request(&self, request: &AgentRequest) -> Result<AgentResponse, LinkError> {
        let mut slot = self.stream.lock().await;
        let mut ws = match slot.take() {
            Some(ws) => ws,
            None => {
                info!("Connecting to coordinator at {}", self.url);
                let (ws, _) = connect_async(self.url.as_str()).await?;
                ws
            }
        };

        let response = exchange(&mut ws, request).await?;
        // Only a healthy stream goes back into the slot.
        *slot = Some(ws);
        Ok(response)
    }
}

async fn exchange(ws: &mut WsStream, request: &AgentRequest) -> Result<AgentResponse, LinkError> {
    let payload = serde_json::to_string(request)?;
    ws.send(Message::Text(payload)).await?;

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Close(_) => break,
            other => debug!("ignoring non-text frame from coordinator: {:?}", other),
        }
    }
    Err(LinkError::ConnectionLost)
}

#[async_trait]
impl EventSink for CoordinatorLink {
    async fn login_detected(&self, login: LoginDetected) -> Result<(), LinkError> {
        match self.request(&AgentRequest::LoginDetected(login)).await? {
            AgentResponse::Ack { success: true, .. } => Ok(()),
            AgentResponse::Ack { error, .. } => Err(LinkError::Rejected(
                error.unwrap_or_else(|| "unspecified".to_string()),
            )),
            AgentResponse::DeviceId { .. } => Err(LinkError::UnexpectedResponse),
        }
    }
}
