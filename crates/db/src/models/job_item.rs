//! Job item entity: one checkpoint with one resolved parameter combination.

use serde::Serialize;
use sqlx::FromRow;
use sampler_core::types::{DbId, Timestamp};
use sampler_core::workflow::SampleParams;

use super::job::SampleJob;
use super::status::{JobItemStatus, StatusId};

/// A row from the `sample_job_items` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct JobItem {
    pub id: DbId,
    pub job_id: DbId,
    pub checkpoint_filename: String,
    /// Model path as ComfyUI knows it; empty when the checkpoint was unmatched.
    pub model_path: String,
    pub prompt_name: String,
    pub prompt_text: String,
    pub negative_prompt: String,
    pub steps: i32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub seed: i64,
    pub width: i32,
    pub height: i32,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
    /// ComfyUI prompt id, set once the item has been submitted.
    pub prompt_id: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl JobItem {
    pub fn status(&self) -> Option<JobItemStatus> {
        JobItemStatus::from_id(self.status_id)
    }

    pub fn has_status(&self, status: JobItemStatus) -> bool {
        self.status_id == status.id()
    }

    /// Borrow this item plus its job's overrides as substitution input.
    pub fn sample_params<'a>(&'a self, job: &'a SampleJob) -> SampleParams<'a> {
        SampleParams {
            checkpoint_filename: &self.checkpoint_filename,
            model_path: &self.model_path,
            prompt_text: &self.prompt_text,
            negative_prompt: &self.negative_prompt,
            steps: self.steps,
            cfg: self.cfg,
            sampler_name: &self.sampler_name,
            scheduler: &self.scheduler,
            seed: self.seed,
            width: self.width,
            height: self.height,
            clip_override: job.clip_override.as_deref(),
            vae_override: job.vae_override.as_deref(),
            shift: job.shift_override,
        }
    }
}

/// Values needed to insert one item at job creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobItem {
    pub checkpoint_filename: String,
    pub model_path: String,
    pub prompt_name: String,
    pub prompt_text: String,
    pub negative_prompt: String,
    pub steps: i32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub seed: i64,
    pub width: i32,
    pub height: i32,
    pub status_id: StatusId,
    pub error_message: Option<String>,
}
