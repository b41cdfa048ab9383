//! WebSocket message processing loop.
//!
//! Reads raw frames from a ComfyUI WebSocket connection, parses them
//! into typed [`ComfyUIMessage`] variants, and forwards them to the
//! broadcast channel as [`StreamEvent::Message`].

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

use crate::client::ComfyUIWsStream;
use crate::events::StreamEvent;
use crate::messages::{parse_message, ComfyUIMessage};

/// Process WebSocket messages from a ComfyUI connection.
///
/// Loops until the WebSocket closes, encounters a fatal receive error,
/// or the stream is exhausted.
///
/// Binary frames (preview images) are ignored.
pub async fn process_messages(
    ws_stream: &mut ComfyUIWsStream,
    event_tx: &broadcast::Sender<StreamEvent>,
) {
    while let Some(msg_result) = ws_stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => handle_text_message(&text, event_tx),
            Ok(Message::Binary(_)) => {
                tracing::trace!("Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "ComfyUI WebSocket closed");
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

/// Parse one text frame and forward it.
pub(crate) fn handle_text_message(text: &str, event_tx: &broadcast::Sender<StreamEvent>) {
    match parse_message(text) {
        Ok(msg) => {
            log_message(&msg);
            // No receivers is fine; the executor may not have subscribed yet.
            let _ = event_tx.send(StreamEvent::Message(msg));
        }
        Err(e) => {
            // ComfyUI emits many message types (crystools, progress_state, ...)
            // that nothing here consumes.
            tracing::debug!(error = %e, raw_message = %text, "Unhandled ComfyUI message");
        }
    }
}

fn log_message(msg: &ComfyUIMessage) {
    match msg {
        ComfyUIMessage::Progress(data) => {
            tracing::trace!(value = data.value, max = data.max, "Generation progress");
        }
        ComfyUIMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
        }
        ComfyUIMessage::ExecutionError(data) => {
            tracing::warn!(
                prompt_id = %data.prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
        }
        other => {
            tracing::debug!(prompt_id = ?other.prompt_id(), "ComfyUI event");
        }
    }
}
