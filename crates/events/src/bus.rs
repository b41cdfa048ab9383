//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! The executor publishes [`HubEvent`]s as jobs advance; the WebSocket
//! feed holds the other end and relays them to browsers.

use chrono::{DateTime, Utc};
use sampler_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A job's counters or status changed.
pub const JOB_PROGRESS: &str = "job_progress";

/// An item finished and its image was written.
pub const SAMPLE_GENERATED: &str = "sample_generated";

const DEFAULT_CAPACITY: usize = 1024;

/// Event envelope pushed to UI clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    /// [`JOB_PROGRESS`] or [`SAMPLE_GENERATED`].
    pub event_type: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl HubEvent {
    /// An event stamped now, with no source and an empty object payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Fan-out hub shared as `Arc<EventBus>`.
///
/// ```rust
/// use sampler_events::bus::{EventBus, HubEvent, JOB_PROGRESS};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(HubEvent::new(JOB_PROGRESS).with_source("sample_job", 1));
/// assert_eq!(rx.try_recv().unwrap().source_entity_id, Some(1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl EventBus {
    /// Receivers that fall more than `capacity` events behind see
    /// `RecvError::Lagged` and skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn publish(&self, event: HubEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
