use std::path::PathBuf;

use sampler_comfyui::api::ComfyUIApiError;
use sampler_core::error::CoreError;
use sampler_core::types::DbId;
use sampler_db::store::StoreError;

/// Errors surfaced by the executor and the job planner.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Stop/resume addressed a job the executor is not working on.
    #[error("job {job_id} not currently active")]
    JobNotActive { job_id: DbId },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Inference(#[from] ComfyUIApiError),

    /// ComfyUI reported success but listed no image for the prompt.
    #[error("ComfyUI returned no output image for prompt {prompt_id}")]
    NoOutput { prompt_id: String },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
