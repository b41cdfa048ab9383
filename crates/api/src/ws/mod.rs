//! WebSocket feed for browser clients.
//!
//! Clients connect to `/api/v1/ws` and receive every [`HubEvent`] published
//! on the event bus as a JSON text frame.
//!
//! [`HubEvent`]: sampler_events::HubEvent

mod feed;
mod handler;
mod heartbeat;
pub mod manager;

pub use feed::start_event_feed;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
