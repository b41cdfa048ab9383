//! Repository for the `presets` table.

use sqlx::types::Json;
use sqlx::PgPool;
use sampler_core::types::DbId;

use crate::models::preset::{CreatePreset, Preset};

/// Column list for `presets` queries.
const COLUMNS: &str = "\
    id, name, prompts, negative_prompt, steps, cfgs, samplers, schedulers, \
    seeds, width, height, created_at, updated_at";

/// Provides CRUD operations for presets.
pub struct PresetRepo;

impl PresetRepo {
    /// Insert a new preset, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreatePreset) -> Result<Preset, sqlx::Error> {
        let query = format!(
            "INSERT INTO presets \
                 (name, prompts, negative_prompt, steps, cfgs, samplers, schedulers, seeds, width, height) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Preset>(&query)
            .bind(&input.name)
            .bind(Json(&input.prompts))
            .bind(&input.negative_prompt)
            .bind(&input.steps)
            .bind(&input.cfgs)
            .bind(&input.samplers)
            .bind(&input.schedulers)
            .bind(&input.seeds)
            .bind(input.width)
            .bind(input.height)
            .fetch_one(pool)
            .await
    }

    /// Find a preset by its primary key.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Preset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM presets WHERE id = $1");
        sqlx::query_as::<_, Preset>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all presets ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<Preset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM presets ORDER BY name ASC");
        sqlx::query_as::<_, Preset>(&query).fetch_all(pool).await
    }
}
