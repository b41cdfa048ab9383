//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration for a single
//! ComfyUI instance. Call [`ComfyUIClient::connect`] to establish a
//! live [`ComfyUIConnection`] over WebSocket.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Raw WebSocket stream type used by the message pump.
pub type ComfyUIWsStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance.
///
/// The client id is fixed for the lifetime of the handle and is reused on
/// every reconnect; [`crate::api::ComfyUIApi`] submits prompts under the
/// same id so ComfyUI addresses their execution events to this socket.
pub struct ComfyUIClient {
    ws_url: String,
    client_id: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: ComfyUIWsStream,
}

impl ComfyUIClient {
    /// Create a new client.
    ///
    /// * `ws_url`    - WebSocket base URL, e.g. `ws://host:8188`.
    /// * `client_id` - id registered with ComfyUI on connect.
    pub fn new(ws_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    /// Create a client with a freshly generated (UUID v4) client id.
    pub fn with_random_id(ws_url: impl Into<String>) -> Self {
        Self::new(ws_url, uuid::Uuid::new_v4().to_string())
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Id this client registers with ComfyUI.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    ///
    /// Appends the client id as a query parameter so that ComfyUI can
    /// address messages back to this specific client.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, self.client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
