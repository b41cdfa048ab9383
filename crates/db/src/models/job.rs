//! Sample job entity and creation DTO.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sampler_core::types::{DbId, Timestamp};

use super::status::{JobStatus, StatusId};

/// A row from the `sample_jobs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SampleJob {
    pub id: DbId,
    pub training_run_name: String,
    pub preset_id: DbId,
    pub workflow_name: String,
    pub vae_override: Option<String>,
    pub clip_override: Option<String>,
    pub shift_override: Option<f64>,
    pub status_id: StatusId,
    pub total_items: i32,
    pub completed_items: i32,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl SampleJob {
    /// Decoded status; `None` only if the row holds an unknown id.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    pub fn has_status(&self, status: JobStatus) -> bool {
        self.status_id == status.id()
    }

    /// Move to `to` if currently `from`, stamping `started_at` on the first
    /// run and `completed_at` on completion. Returns whether it moved.
    pub fn transition(&mut self, from: JobStatus, to: JobStatus, now: Timestamp) -> bool {
        if !self.has_status(from) {
            return false;
        }
        self.status_id = to.id();
        if to == JobStatus::Running {
            self.started_at.get_or_insert(now);
        }
        if to == JobStatus::Completed {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        true
    }
}

/// Values needed to insert a new job. Items are inserted alongside it.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSampleJob {
    pub training_run_name: String,
    pub preset_id: DbId,
    pub workflow_name: String,
    pub vae_override: Option<String>,
    pub clip_override: Option<String>,
    pub shift_override: Option<f64>,
}
