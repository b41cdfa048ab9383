//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, the WebSocket event stream, HTTP API
//! wrappers, and the [`backend`] traits the sample executor drives so it
//! can be exercised against fakes.

pub mod api;
pub mod backend;
pub mod client;
pub mod events;
pub mod history;
pub mod messages;
pub mod processor;
pub mod stream;
