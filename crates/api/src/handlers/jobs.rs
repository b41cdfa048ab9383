//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sampler_core::types::DbId;
use sampler_db::models::job::SampleJob;
use sampler_db::models::job_item::JobItem;
use sampler_pipeline::planner::CreateJobRequest;
use sampler_pipeline::progress::summarize;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// A job together with every one of its items.
#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: SampleJob,
    pub status: &'static str,
    pub items: Vec<JobItem>,
}

impl JobDetail {
    fn new(job: SampleJob, items: Vec<JobItem>) -> Self {
        let status = job.status().map_or("unknown", |s| s.label());
        Self { job, status, items }
    }
}

// ---------------------------------------------------------------------------
// Create / list / get
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Expand the request into items and persist a pending job. The executor
/// picks it up on a later tick. Returns 201 with the created job.
pub async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.planner.create_job(&input).await?;
    let items = state.store.list_items(job.id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: JobDetail::new(job, items) })))
}

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.store.list_jobs().await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.get_job(job_id).await?;
    let items = state.store.list_items(job_id).await?;
    Ok(Json(DataResponse { data: JobDetail::new(job, items) }))
}

/// GET /api/v1/jobs/{id}/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.get_job(job_id).await?;
    let items = state.store.list_items(job_id).await?;
    Ok(Json(DataResponse { data: summarize(&job, &items) }))
}

// ---------------------------------------------------------------------------
// Stop / resume
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/stop
///
/// Only the job the executor is working on can be stopped; anything else
/// is a 409.
pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.executor.request_stop(job_id).await?;
    let job = state.store.get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.executor.request_resume(job_id).await?;
    let job = state.store.get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}
