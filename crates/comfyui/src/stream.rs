//! Long-lived ComfyUI event stream.
//!
//! [`ComfyUIStream`] owns the broadcast channel subscribers listen on and
//! a reader task that pumps the current WebSocket connection into it.
//! Subscriptions survive reconnects: the channel outlives every socket.

use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::events::StreamEvent;
use crate::processor::process_messages;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`ComfyUIStream::close`] waits for the reader to exit.
const READER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct Reader {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Broadcasting wrapper around a reconnectable [`ComfyUIClient`].
pub struct ComfyUIStream {
    client: ComfyUIClient,
    event_tx: broadcast::Sender<StreamEvent>,
    reader: Mutex<Option<Reader>>,
}

impl ComfyUIStream {
    pub fn new(client: ComfyUIClient) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            event_tx,
            reader: Mutex::new(None),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Open the WebSocket and start pumping it.
    ///
    /// A no-op while a previous connection is still being read.
    pub async fn connect(&self) -> Result<(), ComfyUIClientError> {
        let mut reader = self.reader.lock().await;
        if reader.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Ok(());
        }

        let connection = self.client.connect().await?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut ws = connection.ws_stream;
            tokio::select! {
                _ = token.cancelled() => {
                    if let Err(e) = ws.close(None).await {
                        tracing::debug!(error = %e, "Error closing ComfyUI WebSocket");
                    }
                }
                _ = process_messages(&mut ws, &tx) => {
                    tracing::warn!("ComfyUI WebSocket disconnected");
                    let _ = tx.send(StreamEvent::Disconnected);
                }
            }
        });

        *reader = Some(Reader { cancel, handle });
        Ok(())
    }

    /// Stop the reader and close the socket. Safe to call when never
    /// connected.
    pub async fn close(&self) {
        let Some(reader) = self.reader.lock().await.take() else {
            return;
        };
        reader.cancel.cancel();
        if tokio::time::timeout(READER_SHUTDOWN_TIMEOUT, reader.handle)
            .await
            .is_err()
        {
            tracing::warn!("ComfyUI reader did not exit within timeout");
        }
    }
}
