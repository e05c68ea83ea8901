//! Job database operations
//!
//! A Job is the authoritative owner of at most one in-flight external
//! generation task. Status transitions are single UPDATE statements; the
//! retry counter is an explicit integer column with its ceiling enforced by
//! the reconciliation failure path.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunegift_common::db::{Job, JobStatus};
use tunegift_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id_str: String = row.get("id");
    let order_id_str: String = row.get("order_id");
    let quiz_id_str: String = row.get("quiz_id");
    let status_str: String = row.get("status");

    Ok(Job {
        id: parse_uuid(&id_str, "jobs.id")?,
        order_id: parse_uuid(&order_id_str, "jobs.order_id")?,
        quiz_id: parse_uuid(&quiz_id_str, "jobs.quiz_id")?,
        status: JobStatus::parse(&status_str)
            .ok_or_else(|| Error::Internal(format!("unknown job status: {}", status_str)))?,
        title: row.get("title"),
        lyrics: row.get("lyrics"),
        external_task_id: row.get("external_task_id"),
        retry_count: row.get("retry_count"),
        audio_url: row.get("audio_url"),
        error: row.get("error"),
    })
}

const JOB_COLUMNS: &str = "id, order_id, quiz_id, status, title, lyrics, \
                           external_task_id, retry_count, audio_url, error";

/// Insert a new job
pub async fn insert_job(pool: &SqlitePool, job: &Job) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, order_id, quiz_id, status, title, lyrics,
            external_task_id, retry_count, audio_url, error,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(job.id.to_string())
    .bind(job.order_id.to_string())
    .bind(job.quiz_id.to_string())
    .bind(job.status.as_str())
    .bind(&job.title)
    .bind(&job.lyrics)
    .bind(&job.external_task_id)
    .bind(job.retry_count)
    .bind(&job.audio_url)
    .bind(&job.error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load a job by id
pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(job_from_row).transpose()
}

/// Find the most recent non-failed job for an order.
///
/// This query is what makes `ensure_job` idempotent: a `failed` job is the
/// only kind that may be replaced by a new one.
pub async fn find_active_job_for_order(pool: &SqlitePool, order_id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM jobs WHERE order_id = ? AND status != 'failed' \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        JOB_COLUMNS
    ))
    .bind(order_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(job_from_row).transpose()
}

/// Find the job owning an external generation task
pub async fn find_job_by_task_id(pool: &SqlitePool, task_id: &str) -> Result<Option<Job>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM jobs WHERE external_task_id = ? LIMIT 1",
        JOB_COLUMNS
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(job_from_row).transpose()
}

/// Jobs the polling sweep should examine: in-flight statuses with a task id,
/// plus (defensively) completed jobs missing their audio URL to recover from
/// a lost callback.
pub async fn find_jobs_for_poll(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM jobs
        WHERE external_task_id IS NOT NULL
          AND (
            status IN ('processing', 'audio_processing')
            OR (status = 'completed' AND (audio_url IS NULL OR audio_url = ''))
          )
        ORDER BY updated_at ASC
        LIMIT ?
        "#,
        JOB_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Set job status
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: JobStatus) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist the lyrics stage result
pub async fn set_lyrics(
    pool: &SqlitePool,
    id: Uuid,
    title: Option<&str>,
    lyrics: &str,
    status: JobStatus,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET title = ?, lyrics = ?, status = ?, error = NULL, \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(title)
    .bind(lyrics)
    .bind(status.as_str())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a job failed, preserving the error message for diagnosis
pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', error = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(error)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Store the external task id once dispatched
pub async fn set_task_id(pool: &SqlitePool, id: Uuid, task_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET external_task_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(task_id)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Store the first variant's audio URL on the job as a convenience field
pub async fn set_audio_url(pool: &SqlitePool, id: Uuid, audio_url: &str) -> Result<()> {
    sqlx::query("UPDATE jobs SET audio_url = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(audio_url)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Increment the retry counter and park the job in `retry_pending`.
/// Returns the new counter value.
pub async fn increment_retry(pool: &SqlitePool, id: Uuid) -> Result<i64> {
    sqlx::query(
        "UPDATE jobs SET retry_count = retry_count + 1, status = 'retry_pending', \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(id.to_string())
    .execute(pool)
    .await?;

    let count: i64 = sqlx::query_scalar("SELECT retry_count FROM jobs WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunegift_common::db::init_memory_database;

    fn test_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            title: None,
            lyrics: None,
            external_task_id: None,
            retry_count: 0,
            audio_url: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_job() {
        let pool = init_memory_database().await.unwrap();
        let job = test_job();
        insert_job(&pool, &job).await.unwrap();

        let loaded = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.retry_count, 0);
        assert_eq!(loaded.order_id, job.order_id);
    }

    #[tokio::test]
    async fn test_active_job_excludes_failed() {
        let pool = init_memory_database().await.unwrap();
        let mut job = test_job();
        insert_job(&pool, &job).await.unwrap();

        assert!(find_active_job_for_order(&pool, job.order_id).await.unwrap().is_some());

        mark_failed(&pool, job.id, "provider exploded").await.unwrap();
        assert!(find_active_job_for_order(&pool, job.order_id).await.unwrap().is_none());

        // A replacement job for the same order becomes the active one
        job.id = Uuid::new_v4();
        insert_job(&pool, &job).await.unwrap();
        let active = find_active_job_for_order(&pool, job.order_id).await.unwrap().unwrap();
        assert_eq!(active.id, job.id);
    }

    #[tokio::test]
    async fn test_poll_candidates() {
        let pool = init_memory_database().await.unwrap();

        // In-flight with task id: selected
        let mut a = test_job();
        insert_job(&pool, &a).await.unwrap();
        set_task_id(&pool, a.id, "task-a").await.unwrap();
        set_status(&pool, a.id, JobStatus::AudioProcessing).await.unwrap();

        // In-flight without task id: not selected
        let b = test_job();
        insert_job(&pool, &b).await.unwrap();
        set_status(&pool, b.id, JobStatus::Processing).await.unwrap();

        // Completed but missing audio URL: selected (lost-callback recovery)
        let c = test_job();
        insert_job(&pool, &c).await.unwrap();
        set_task_id(&pool, c.id, "task-c").await.unwrap();
        set_status(&pool, c.id, JobStatus::Completed).await.unwrap();

        // Completed with audio URL: not selected
        a.id = Uuid::new_v4();
        a.order_id = Uuid::new_v4();
        insert_job(&pool, &a).await.unwrap();
        set_task_id(&pool, a.id, "task-d").await.unwrap();
        set_audio_url(&pool, a.id, "https://cdn.example.com/d.mp3").await.unwrap();
        set_status(&pool, a.id, JobStatus::Completed).await.unwrap();

        let candidates = find_jobs_for_poll(&pool, 50).await.unwrap();
        let tasks: Vec<_> =
            candidates.iter().filter_map(|j| j.external_task_id.as_deref()).collect();
        assert!(tasks.contains(&"task-a"));
        assert!(tasks.contains(&"task-c"));
        assert!(!tasks.contains(&"task-d"));
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_increment_retry() {
        let pool = init_memory_database().await.unwrap();
        let job = test_job();
        insert_job(&pool, &job).await.unwrap();

        assert_eq!(increment_retry(&pool, job.id).await.unwrap(), 1);
        assert_eq!(increment_retry(&pool, job.id).await.unwrap(), 2);

        let loaded = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::RetryPending);
        assert_eq!(loaded.retry_count, 2);
    }
}
