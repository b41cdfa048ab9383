//! Handlers for the `/presets` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sampler_core::types::DbId;
use sampler_db::models::preset::CreatePreset;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/presets
pub async fn create_preset(
    State(state): State<AppState>,
    Json(input): Json<CreatePreset>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let preset = state.store.create_preset(&input).await?;

    tracing::info!(
        preset_id = preset.id,
        name = %preset.name,
        combinations = preset.combinations_per_checkpoint(),
        "Preset created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: preset })))
}

/// GET /api/v1/presets
pub async fn list_presets(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let presets = state.store.list_presets().await?;
    Ok(Json(DataResponse { data: presets }))
}

/// GET /api/v1/presets/{id}
pub async fn get_preset(
    State(state): State<AppState>,
    Path(preset_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let preset = state.store.get_preset(preset_id).await?;
    Ok(Json(DataResponse { data: preset }))
}
