pub mod health;
pub mod jobs;
pub mod presets;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                         WebSocket event feed
///
/// /presets                    list, create
/// /presets/{id}               get
///
/// /jobs                       list, create
/// /jobs/{id}                  get (with items)
/// /jobs/{id}/progress         per-checkpoint roll-up
/// /jobs/{id}/stop             pause the active job (POST)
/// /jobs/{id}/resume           resume a paused job (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/presets", presets::router())
        .nest("/jobs", jobs::router())
}
