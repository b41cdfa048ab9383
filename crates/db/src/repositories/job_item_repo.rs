//! Repository for the `sample_job_items` table.

use sqlx::PgPool;
use sampler_core::types::DbId;

use crate::models::job_item::JobItem;

/// Column list for `sample_job_items` queries.
const COLUMNS: &str = "\
    id, job_id, checkpoint_filename, model_path, prompt_name, prompt_text, \
    negative_prompt, steps, cfg, sampler_name, scheduler, seed, width, height, \
    status_id, error_message, output_path, prompt_id, \
    created_at, started_at, completed_at, updated_at";

/// Provides read/update operations for job items. Items are only ever
/// inserted by [`SampleJobRepo::create_with_items`](super::SampleJobRepo::create_with_items).
pub struct JobItemRepo;

impl JobItemRepo {
    /// List a job's items in insertion order.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sample_job_items WHERE job_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, JobItem>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Write back the mutable columns of an item. Returns `false` when no
    /// row matched the id.
    pub async fn update(pool: &PgPool, item: &JobItem) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sample_job_items \
             SET status_id = $2, error_message = $3, output_path = $4, prompt_id = $5, \
                 started_at = $6, completed_at = $7, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(item.id)
        .bind(item.status_id)
        .bind(&item.error_message)
        .bind(&item.output_path)
        .bind(&item.prompt_id)
        .bind(item.started_at)
        .bind(item.completed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
