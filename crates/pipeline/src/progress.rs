//! Roll-up progress statistics for a job.

use std::collections::BTreeMap;

use sampler_core::types::DbId;
use sampler_db::models::job::SampleJob;
use sampler_db::models::job_item::JobItem;
use sampler_db::models::status::JobItemStatus;
use serde::Serialize;

/// Item counts for one checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointProgress {
    pub checkpoint: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Items not yet finished, including the one in flight.
    pub pending: usize,
}

impl CheckpointProgress {
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub job_id: DbId,
    pub status: String,
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    pub pending_items: usize,
    /// First checkpoint (by name) that still has unfinished items.
    pub current_checkpoint: Option<String>,
    pub checkpoints: Vec<CheckpointProgress>,
}

/// Group `items` by checkpoint and count their states.
pub fn summarize(job: &SampleJob, items: &[JobItem]) -> JobProgress {
    let mut by_checkpoint: BTreeMap<&str, CheckpointProgress> = BTreeMap::new();

    for item in items {
        let entry = by_checkpoint
            .entry(item.checkpoint_filename.as_str())
            .or_insert_with(|| CheckpointProgress {
                checkpoint: item.checkpoint_filename.clone(),
                ..Default::default()
            });
        entry.total += 1;
        match item.status() {
            Some(JobItemStatus::Completed) => entry.completed += 1,
            Some(JobItemStatus::Failed) => entry.failed += 1,
            Some(JobItemStatus::Skipped) => entry.skipped += 1,
            Some(JobItemStatus::Pending | JobItemStatus::Running) | None => entry.pending += 1,
        }
    }

    let checkpoints: Vec<CheckpointProgress> = by_checkpoint.into_values().collect();
    let current_checkpoint = checkpoints
        .iter()
        .find(|c| !c.is_complete())
        .map(|c| c.checkpoint.clone());

    JobProgress {
        job_id: job.id,
        status: job
            .status()
            .map(|s| s.label().to_string())
            .unwrap_or_else(|| format!("unknown({})", job.status_id)),
        total_items: items.len(),
        completed_items: checkpoints.iter().map(|c| c.completed).sum(),
        failed_items: checkpoints.iter().map(|c| c.failed).sum(),
        skipped_items: checkpoints.iter().map(|c| c.skipped).sum(),
        pending_items: checkpoints.iter().map(|c| c.pending).sum(),
        current_checkpoint,
        checkpoints,
    }
}
