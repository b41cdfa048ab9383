//! Checkpoint sampler event hub.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`; the WebSocket feed subscribes to it.
//! - [`HubEvent`]: the event envelope pushed to UI clients.

pub mod bus;

pub use bus::{EventBus, HubEvent};
