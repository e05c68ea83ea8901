//! Audio dispatch
//!
//! Hands approved lyrics to the music provider and owns the bounded retry
//! loop around submission. A job never has more than one in-flight external
//! task: the task id is written before the status flips to
//! `audio_processing`, and re-dispatch only happens from the failure paths.

use chrono::Utc;
use tunegift_common::db::{Job, JobStatus};
use tunegift_common::events::PipelineEvent;
use tunegift_common::{Error, Result};
use uuid::Uuid;

use crate::db;
use crate::services::music_client::GenerationRequest;
use crate::AppState;

/// Automatic re-dispatches after the first attempt (3 attempts total)
pub const AUDIO_RETRY_CEILING: i64 = 2;

fn build_request(job: &Job, style: &str, voice_type: &str) -> Result<GenerationRequest> {
    let lyrics = job
        .lyrics
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("job {} has no lyrics to dispatch", job.id)))?;

    Ok(GenerationRequest {
        lyrics: lyrics.to_string(),
        title: job.title.clone().unwrap_or_else(|| "Your Song".to_string()),
        style: style.to_string(),
        voice_type: voice_type.to_string(),
    })
}

/// Submit the job's lyrics to the music provider, retrying submission up to
/// the retry ceiling. On success the job enters `audio_processing`; once the
/// ceiling is exhausted it is marked `failed`.
pub async fn run_dispatch(state: &AppState, job_id: Uuid) -> Result<()> {
    loop {
        let job = db::jobs::get_job(&state.db, job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        if job.status == JobStatus::Failed {
            return Ok(());
        }

        let quiz = db::orders::get_quiz(&state.db, job.quiz_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quiz {}", job.quiz_id)))?;
        let style = quiz.style.clone().unwrap_or_else(|| "pop".to_string());
        let voice_type = quiz.voice_type.clone().unwrap_or_else(|| "any".to_string());

        let request = build_request(&job, &style, &voice_type)?;

        match state.music.submit(&request).await {
            Ok(task_id) => {
                db::jobs::set_task_id(&state.db, job.id, &task_id).await?;
                db::jobs::set_status(&state.db, job.id, JobStatus::AudioProcessing).await?;

                tracing::info!(job_id = %job.id, task_id = %task_id, "Audio generation dispatched");
                state.event_bus.emit(PipelineEvent::AudioDispatched {
                    job_id: job.id,
                    order_id: job.order_id,
                    task_id,
                    timestamp: Utc::now(),
                });
                return Ok(());
            }
            Err(e) => {
                // Counter caps at the ceiling: the final failure is recorded
                // without an increment
                if job.retry_count >= AUDIO_RETRY_CEILING {
                    let message = format!(
                        "audio dispatch failed after {} attempts: {}",
                        job.retry_count + 1,
                        e
                    );
                    tracing::error!(job_id = %job.id, retry_count = job.retry_count, error = %e, "Retry ceiling reached, job failed");
                    db::jobs::mark_failed(&state.db, job.id, &message).await?;
                    state.event_bus.emit(PipelineEvent::JobFailed {
                        job_id: job.id,
                        order_id: job.order_id,
                        error: message,
                        timestamp: Utc::now(),
                    });
                    return Ok(());
                }
                let retry_count = db::jobs::increment_retry(&state.db, job.id).await?;
                tracing::warn!(
                    job_id = %job.id,
                    retry_count,
                    error = %e,
                    "Audio dispatch failed, retrying"
                );
            }
        }
    }
}
