//! Metadata sidecars written beside generated samples.
//!
//! A sidecar is first written to a hidden temp file in the target
//! directory and then renamed over the final `.json` path, so readers
//! never observe a partially written record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sampler_core::naming::sidecar_path;
use sampler_core::types::{DbId, Timestamp};
use sampler_db::models::job::SampleJob;
use sampler_db::models::job_item::JobItem;
use serde::Serialize;

use crate::fs::FileSystem;

#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("Failed to serialize sidecar: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write sidecar temp file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move sidecar into place at {}: {source}", path.display())]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Record describing how a sample was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleMetadata {
    pub checkpoint: String,
    pub prompt_name: String,
    pub prompt_text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub negative_prompt: String,
    pub steps: i32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub seed: i64,
    pub width: i32,
    pub height: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vae: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<f64>,
    pub job_id: DbId,
    pub workflow_name: String,
    pub generated_at: Timestamp,
}

impl SampleMetadata {
    pub fn new(job: &SampleJob, item: &JobItem, generated_at: Timestamp) -> Self {
        Self {
            checkpoint: item.checkpoint_filename.clone(),
            prompt_name: item.prompt_name.clone(),
            prompt_text: item.prompt_text.clone(),
            negative_prompt: item.negative_prompt.clone(),
            steps: item.steps,
            cfg: item.cfg,
            sampler_name: item.sampler_name.clone(),
            scheduler: item.scheduler.clone(),
            seed: item.seed,
            width: item.width,
            height: item.height,
            vae: job.vae_override.clone().filter(|v| !v.is_empty()),
            clip: job.clip_override.clone().filter(|c| !c.is_empty()),
            shift: job.shift_override,
            job_id: job.id,
            workflow_name: job.workflow_name.clone(),
            generated_at,
        }
    }
}

pub struct SidecarWriter {
    fs: Arc<dyn FileSystem>,
}

impl SidecarWriter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Write the sidecar for `image_path`, returning where it landed.
    ///
    /// On a failed rename the temp file is removed before the error is
    /// returned.
    pub async fn write(
        &self,
        image_path: &Path,
        metadata: &SampleMetadata,
    ) -> Result<PathBuf, SidecarError> {
        let final_path = sidecar_path(image_path);
        let tmp_path = temp_path(&final_path);
        let body = serde_json::to_vec_pretty(metadata)?;

        self.fs
            .write(&tmp_path, &body)
            .await
            .map_err(|source| SidecarError::Write {
                path: tmp_path.clone(),
                source,
            })?;

        if let Err(source) = self.fs.rename(&tmp_path, &final_path).await {
            if let Err(e) = self.fs.remove_file(&tmp_path).await {
                tracing::debug!(path = %tmp_path.display(), error = %e, "Could not remove sidecar temp file");
            }
            return Err(SidecarError::Rename {
                path: final_path,
                source,
            });
        }

        Ok(final_path)
    }
}

/// `dir/.name.json.tmp` for `dir/name.json`.
fn temp_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}.tmp"))
}
