use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> create_job
/// GET    /{id}            -> get_job
/// GET    /{id}/progress   -> get_progress
/// POST   /{id}/stop       -> stop_job
/// POST   /{id}/resume     -> resume_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/progress", get(jobs::get_progress))
        .route("/{id}/stop", post(jobs::stop_job))
        .route("/{id}/resume", post(jobs::resume_job))
}
