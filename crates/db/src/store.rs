//! The job store port consumed by the executor and job planner.
//!
//! [`JobStore`] is the only way the pipeline reads or writes durable state.
//! [`PgJobStore`] backs it with the repositories in this crate.

use async_trait::async_trait;
use sampler_core::types::DbId;

use crate::models::job::{NewSampleJob, SampleJob};
use crate::models::job_item::{JobItem, NewJobItem};
use crate::models::preset::{CreatePreset, Preset};
use crate::models::status::JobStatus;
use crate::repositories::{JobItemRepo, PresetRepo, SampleJobRepo};
use crate::DbPool;

/// Errors surfaced by a [`JobStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record to read or update does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// The backing database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable job/item storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Every job, oldest first.
    async fn list_jobs(&self) -> Result<Vec<SampleJob>, StoreError>;

    async fn get_job(&self, job_id: DbId) -> Result<SampleJob, StoreError>;

    /// Move a job from `from` to `to` if it is still in `from`.
    ///
    /// Returns the updated job, or `None` when its status had already
    /// changed. A missing job is `NotFound`.
    async fn transition_job(
        &self,
        job_id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<SampleJob>, StoreError>;

    /// Record the completed item count. Never touches the status.
    async fn set_completed_items(&self, job_id: DbId, completed_items: i32) -> Result<SampleJob, StoreError>;

    /// A job's items in creation order.
    async fn list_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError>;

    /// Persist the mutable fields of `item`.
    async fn update_item(&self, item: &JobItem) -> Result<(), StoreError>;

    /// Insert a pending job and all of its items atomically.
    async fn create_job(&self, job: &NewSampleJob, items: &[NewJobItem]) -> Result<SampleJob, StoreError>;

    async fn get_preset(&self, preset_id: DbId) -> Result<Preset, StoreError>;

    /// Every preset, ordered by name.
    async fn list_presets(&self) -> Result<Vec<Preset>, StoreError>;

    async fn create_preset(&self, input: &CreatePreset) -> Result<Preset, StoreError>;

    /// Liveness probe for the backing storage.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// [`JobStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn list_jobs(&self) -> Result<Vec<SampleJob>, StoreError> {
        Ok(SampleJobRepo::list_all(&self.pool).await?)
    }

    async fn get_job(&self, job_id: DbId) -> Result<SampleJob, StoreError> {
        SampleJobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "SampleJob",
                id: job_id,
            })
    }

    async fn transition_job(
        &self,
        job_id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<SampleJob>, StoreError> {
        match SampleJobRepo::transition(&self.pool, job_id, from, to).await? {
            Some(job) => Ok(Some(job)),
            None => self.get_job(job_id).await.map(|_| None),
        }
    }

    async fn set_completed_items(&self, job_id: DbId, completed_items: i32) -> Result<SampleJob, StoreError> {
        SampleJobRepo::set_completed_items(&self.pool, job_id, completed_items)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "SampleJob",
                id: job_id,
            })
    }

    async fn list_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError> {
        Ok(JobItemRepo::list_by_job(&self.pool, job_id).await?)
    }

    async fn update_item(&self, item: &JobItem) -> Result<(), StoreError> {
        if JobItemRepo::update(&self.pool, item).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                entity: "JobItem",
                id: item.id,
            })
        }
    }

    async fn create_job(&self, job: &NewSampleJob, items: &[NewJobItem]) -> Result<SampleJob, StoreError> {
        Ok(SampleJobRepo::create_with_items(&self.pool, job, items).await?)
    }

    async fn get_preset(&self, preset_id: DbId) -> Result<Preset, StoreError> {
        PresetRepo::find_by_id(&self.pool, preset_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "Preset",
                id: preset_id,
            })
    }

    async fn list_presets(&self) -> Result<Vec<Preset>, StoreError> {
        Ok(PresetRepo::list(&self.pool).await?)
    }

    async fn create_preset(&self, input: &CreatePreset) -> Result<Preset, StoreError> {
        Ok(PresetRepo::create(&self.pool, input).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
