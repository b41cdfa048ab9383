//! Events delivered to subscribers of the ComfyUI stream.

use crate::messages::ComfyUIMessage;

/// One item on the stream's broadcast channel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A parsed WebSocket message.
    Message(ComfyUIMessage),

    /// The WebSocket connection was lost. Not sent for a deliberate close.
    Disconnected,
}
