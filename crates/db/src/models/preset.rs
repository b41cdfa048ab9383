//! Preset entity: the parameter lists a job expands into items.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use sampler_core::error::CoreError;
use sampler_core::types::{DbId, Timestamp};

/// A prompt with a short name used in sample filenames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedPrompt {
    pub name: String,
    pub text: String,
}

/// A row from the `presets` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Preset {
    pub id: DbId,
    pub name: String,
    pub prompts: Json<Vec<NamedPrompt>>,
    pub negative_prompt: String,
    pub steps: Vec<i32>,
    pub cfgs: Vec<f64>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
    pub seeds: Vec<i64>,
    pub width: i32,
    pub height: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Preset {
    /// Number of parameter combinations per checkpoint.
    pub fn combinations_per_checkpoint(&self) -> usize {
        [
            self.prompts.len(),
            self.steps.len(),
            self.cfgs.len(),
            self.samplers.len(),
            self.schedulers.len(),
            self.seeds.len(),
        ]
        .into_iter()
        .fold(1, usize::saturating_mul)
    }
}

/// DTO for `POST /api/v1/presets`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePreset {
    pub name: String,
    pub prompts: Vec<NamedPrompt>,
    #[serde(default)]
    pub negative_prompt: String,
    pub steps: Vec<i32>,
    pub cfgs: Vec<f64>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
    pub seeds: Vec<i64>,
    pub width: i32,
    pub height: i32,
}

impl CreatePreset {
    /// Reject presets that cannot produce a single sample.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        if self.prompts.is_empty() {
            return Err(CoreError::Validation("at least one prompt is required".into()));
        }
        if self
            .prompts
            .iter()
            .any(|p| p.name.trim().is_empty() || p.text.trim().is_empty())
        {
            return Err(CoreError::Validation("prompts need a name and text".into()));
        }

        let lists = [
            ("steps", self.steps.len()),
            ("cfgs", self.cfgs.len()),
            ("samplers", self.samplers.len()),
            ("schedulers", self.schedulers.len()),
            ("seeds", self.seeds.len()),
        ];
        if let Some((field, _)) = lists.iter().find(|(_, len)| *len == 0) {
            return Err(CoreError::Validation(format!("{field} must not be empty")));
        }

        if self.steps.iter().any(|&s| s <= 0) {
            return Err(CoreError::Validation("steps must be positive".into()));
        }
        if self.cfgs.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(CoreError::Validation("cfgs must be positive numbers".into()));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(CoreError::Validation("width and height must be positive".into()));
        }
        Ok(())
    }
}
