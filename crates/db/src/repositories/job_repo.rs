//! Repository for the `sample_jobs` table.
//!
//! Status changes are conditional writes keyed on the expected current
//! status; no full-row updates.

use sqlx::PgPool;
use sampler_core::types::DbId;

use crate::models::job::{NewSampleJob, SampleJob};
use crate::models::job_item::NewJobItem;
use crate::models::status::JobStatus;

/// Column list for `sample_jobs` queries.
const COLUMNS: &str = "\
    id, training_run_name, preset_id, workflow_name, \
    vae_override, clip_override, shift_override, \
    status_id, total_items, completed_items, \
    created_at, started_at, completed_at, updated_at";

/// Provides CRUD operations for sample jobs.
pub struct SampleJobRepo;

impl SampleJobRepo {
    /// Insert a pending job together with all of its items in one transaction.
    ///
    /// `total_items` is set to the number of items inserted.
    pub async fn create_with_items(
        pool: &PgPool,
        input: &NewSampleJob,
        items: &[NewJobItem],
    ) -> Result<SampleJob, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO sample_jobs \
                 (training_run_name, preset_id, workflow_name, vae_override, clip_override, \
                  shift_override, status_id, total_items) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, SampleJob>(&query)
            .bind(&input.training_run_name)
            .bind(input.preset_id)
            .bind(&input.workflow_name)
            .bind(&input.vae_override)
            .bind(&input.clip_override)
            .bind(input.shift_override)
            .bind(JobStatus::Pending.id())
            .bind(items.len() as i32)
            .fetch_one(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                "INSERT INTO sample_job_items \
                     (job_id, checkpoint_filename, model_path, prompt_name, prompt_text, \
                      negative_prompt, steps, cfg, sampler_name, scheduler, seed, width, height, \
                      status_id, error_message) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(job.id)
            .bind(&item.checkpoint_filename)
            .bind(&item.model_path)
            .bind(&item.prompt_name)
            .bind(&item.prompt_text)
            .bind(&item.negative_prompt)
            .bind(item.steps)
            .bind(item.cfg)
            .bind(&item.sampler_name)
            .bind(&item.scheduler)
            .bind(item.seed)
            .bind(item.width)
            .bind(item.height)
            .bind(item.status_id)
            .bind(&item.error_message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    /// Find a job by its primary key.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SampleJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sample_jobs WHERE id = $1");
        sqlx::query_as::<_, SampleJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List every job, oldest first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<SampleJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sample_jobs ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, SampleJob>(&query).fetch_all(pool).await
    }

    /// Move a job from `from` to `to` in one conditional write, stamping
    /// `started_at` on the first run and `completed_at` on completion.
    ///
    /// Returns `None` when no job with that id is currently in `from`.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<SampleJob>, sqlx::Error> {
        let query = format!(
            "UPDATE sample_jobs \
             SET status_id = $3, \
                 started_at = CASE WHEN $4 THEN COALESCE(started_at, NOW()) ELSE started_at END, \
                 completed_at = CASE WHEN $5 THEN NOW() ELSE completed_at END, \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SampleJob>(&query)
            .bind(id)
            .bind(from.id())
            .bind(to.id())
            .bind(to == JobStatus::Running)
            .bind(to == JobStatus::Completed)
            .fetch_optional(pool)
            .await
    }

    /// Set `completed_items` without touching the status columns.
    pub async fn set_completed_items(
        pool: &PgPool,
        id: DbId,
        completed_items: i32,
    ) -> Result<Option<SampleJob>, sqlx::Error> {
        let query = format!(
            "UPDATE sample_jobs SET completed_items = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SampleJob>(&query)
            .bind(id)
            .bind(completed_items)
            .fetch_optional(pool)
            .await
    }
}
