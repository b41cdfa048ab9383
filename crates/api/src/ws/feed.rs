//! Bridge from the in-process [`EventBus`] to connected browsers.
//!
//! Each bus event is serialized once and broadcast as a text frame.

use std::sync::Arc;

use axum::extract::ws::Message;
use sampler_events::{EventBus, HubEvent};
use tokio::sync::broadcast;

use crate::ws::manager::WsManager;

/// Spawn a task relaying every bus event to all WebSocket clients.
///
/// Runs until the bus is dropped. Subscribes before returning so no event
/// published after this call is missed.
pub fn start_event_feed(bus: &EventBus, ws_manager: Arc<WsManager>) -> tokio::task::JoinHandle<()> {
    let rx = bus.subscribe();
    tokio::spawn(run_feed(rx, ws_manager))
}

async fn run_feed(mut rx: broadcast::Receiver<HubEvent>, ws_manager: Arc<WsManager>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(event_type = %event.event_type, error = %e, "Failed to encode hub event");
                        continue;
                    }
                };
                let delivered = ws_manager.broadcast(Message::Text(text.into())).await;
                tracing::trace!(event_type = %event.event_type, delivered, "Hub event relayed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "WebSocket feed fell behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("WebSocket feed stopped");
}
