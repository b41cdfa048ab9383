//! Job creation: validation plus expansion of checkpoints × preset
//! parameters into items.

use std::collections::HashSet;
use std::sync::Arc;

use sampler_comfyui::backend::InferenceClient;
use sampler_core::checkpoint::match_model_path;
use sampler_core::error::CoreError;
use sampler_core::types::DbId;
use sampler_db::models::job::{NewSampleJob, SampleJob};
use sampler_db::models::job_item::NewJobItem;
use sampler_db::models::preset::Preset;
use sampler_db::models::status::JobItemStatus;
use sampler_db::store::JobStore;
use serde::Deserialize;

use crate::error::ExecutorError;
use crate::loader::WorkflowLoader;

/// Largest number of items a single job may expand to.
pub const MAX_JOB_ITEMS: usize = 10_000;

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub training_run_name: String,
    /// Checkpoint filenames as they appear in the training run.
    pub checkpoints: Vec<String>,
    pub preset_id: DbId,
    pub workflow_name: String,
    #[serde(default)]
    pub vae_override: Option<String>,
    #[serde(default)]
    pub clip_override: Option<String>,
    #[serde(default)]
    pub shift_override: Option<f64>,
}

impl CreateJobRequest {
    fn validate(&self) -> Result<(), CoreError> {
        if self.training_run_name.trim().is_empty() {
            return Err(CoreError::Validation("training_run_name is required".into()));
        }
        if self.workflow_name.trim().is_empty() {
            return Err(CoreError::Validation("workflow_name is required".into()));
        }
        if self.checkpoints.is_empty() {
            return Err(CoreError::Validation("at least one checkpoint is required".into()));
        }
        if self.checkpoints.iter().any(|c| c.trim().is_empty()) {
            return Err(CoreError::Validation("checkpoint names must not be empty".into()));
        }
        if self.shift_override.is_some_and(|s| !s.is_finite()) {
            return Err(CoreError::Validation("shift_override must be a finite number".into()));
        }
        Ok(())
    }

    fn to_new_job(&self) -> NewSampleJob {
        NewSampleJob {
            training_run_name: self.training_run_name.trim().to_string(),
            preset_id: self.preset_id,
            workflow_name: self.workflow_name.trim().to_string(),
            vae_override: non_blank(&self.vae_override),
            clip_override: non_blank(&self.clip_override),
            shift_override: self.shift_override,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub struct JobPlanner {
    store: Arc<dyn JobStore>,
    client: Arc<dyn InferenceClient>,
    loader: Arc<dyn WorkflowLoader>,
}

impl JobPlanner {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn InferenceClient>,
        loader: Arc<dyn WorkflowLoader>,
    ) -> Self {
        Self {
            store,
            client,
            loader,
        }
    }

    /// Validate `request` and persist a pending job with all of its items.
    pub async fn create_job(&self, request: &CreateJobRequest) -> Result<SampleJob, ExecutorError> {
        request.validate()?;

        let preset = self.store.get_preset(request.preset_id).await?;
        if preset.combinations_per_checkpoint() == 0 {
            return Err(CoreError::Validation(format!(
                "Preset '{}' yields no parameter combinations",
                preset.name
            ))
            .into());
        }
        let distinct: HashSet<&str> = request.checkpoints.iter().map(|c| c.trim()).collect();
        let planned = distinct.len().saturating_mul(preset.combinations_per_checkpoint());
        if planned > MAX_JOB_ITEMS {
            return Err(CoreError::Validation(format!(
                "Job would create {planned} items; at most {MAX_JOB_ITEMS} are allowed"
            ))
            .into());
        }
        self.loader.load(request.workflow_name.trim()).await?;

        let models = self.client.list_models().await?;
        let items = plan_items(&request.checkpoints, &models, &preset);
        let skipped = items
            .iter()
            .filter(|i| i.status_id == JobItemStatus::Skipped.id())
            .count();

        let job = self.store.create_job(&request.to_new_job(), &items).await?;
        tracing::info!(
            job_id = job.id,
            training_run = %job.training_run_name,
            total_items = job.total_items,
            skipped,
            "Sample job created",
        );
        Ok(job)
    }
}

/// Expand checkpoints × prompts × steps × cfgs × samplers × schedulers ×
/// seeds into items, in that nesting order.
///
/// Checkpoints without a matching model become `skipped` items carrying an
/// explanatory error. Duplicate checkpoint names are planned once.
pub fn plan_items(checkpoints: &[String], models: &[String], preset: &Preset) -> Vec<NewJobItem> {
    let mut items = Vec::with_capacity(checkpoints.len() * preset.combinations_per_checkpoint());
    let mut seen: Vec<&str> = Vec::new();

    for checkpoint in checkpoints {
        let checkpoint = checkpoint.trim();
        if seen.contains(&checkpoint) {
            continue;
        }
        seen.push(checkpoint);

        let model_path = match_model_path(checkpoint, models);
        let (status, error_message) = match model_path {
            Some(_) => (JobItemStatus::Pending, None),
            None => (
                JobItemStatus::Skipped,
                Some(format!("No ComfyUI model matches checkpoint '{checkpoint}'")),
            ),
        };

        for prompt in preset.prompts.iter() {
            for &steps in &preset.steps {
                for &cfg in &preset.cfgs {
                    for sampler_name in &preset.samplers {
                        for scheduler in &preset.schedulers {
                            for &seed in &preset.seeds {
                                items.push(NewJobItem {
                                    checkpoint_filename: checkpoint.to_string(),
                                    model_path: model_path.unwrap_or_default().to_string(),
                                    prompt_name: prompt.name.clone(),
                                    prompt_text: prompt.text.clone(),
                                    negative_prompt: preset.negative_prompt.clone(),
                                    steps,
                                    cfg,
                                    sampler_name: sampler_name.clone(),
                                    scheduler: scheduler.clone(),
                                    seed,
                                    width: preset.width,
                                    height: preset.height,
                                    status_id: status.id(),
                                    error_message: error_message.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    items
}
