use std::sync::Arc;

use sampler_db::store::JobStore;
use sampler_events::EventBus;
use sampler_pipeline::planner::JobPlanner;
use sampler_pipeline::JobExecutor;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Durable jobs, items and presets.
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<JobExecutor>,
    pub planner: Arc<JobPlanner>,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Progress and sample events fanned out to WebSocket clients.
    pub event_bus: Arc<EventBus>,
}
