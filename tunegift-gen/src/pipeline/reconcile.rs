//! Task reconciliation
//!
//! The webhook callback and the poll sweep feed the exact same per-variant
//! algorithm. Correctness under duplicate or interleaved delivery rests on
//! the natural-key upserts in the db layer, not on any in-memory
//! coordination: replaying a payload converges on the same rows.

use chrono::{Duration, Utc};
use serde_json::Value;
use tunegift_common::db::{Job, JobStatus, PlanTier};
use tunegift_common::events::PipelineEvent;
use tunegift_common::Result;

use crate::db;
use crate::db::songs::SongUpsert;
use crate::pipeline::dispatch::{self, AUDIO_RETRY_CEILING};
use crate::services::music_client::{self, TaskPhase, TaskStatus};
use crate::AppState;

/// Variants the provider renders per task
pub const VARIANTS_PER_JOB: i64 = 2;

/// Smallest plausible full-song artifact
pub const MIN_SONG_BYTES: usize = 10 * 1024;

/// What reconciliation concluded about one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// At least one variant persisted; job completed
    Completed { songs: usize },
    /// Provider reported terminal failure (job retried or failed)
    Failed,
    /// Nothing actionable yet
    StillProcessing,
    /// No job owns this task id
    Ignored,
}

/// Entry point for the music webhook: extract the task id, normalize the
/// payload and reconcile.
pub async fn reconcile_payload(state: &AppState, payload: &Value) -> Result<ReconcileOutcome> {
    // The envelope may wrap the task record under "data"
    let record = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);

    let Some(task_id) = music_client::extract_task_id(record) else {
        tracing::warn!("Music callback without a recognizable task id, ignoring");
        return Ok(ReconcileOutcome::Ignored);
    };

    let status = music_client::normalize_status(record);
    reconcile_task(state, &task_id, &status).await
}

/// Reconcile one task's reported status against the database
pub async fn reconcile_task(
    state: &AppState,
    task_id: &str,
    status: &TaskStatus,
) -> Result<ReconcileOutcome> {
    let Some(job) = db::jobs::find_job_by_task_id(&state.db, task_id).await? else {
        tracing::warn!(task_id, "No job owns this task id, ignoring");
        return Ok(ReconcileOutcome::Ignored);
    };

    match status.phase {
        TaskPhase::Failed => {
            let message = status.error.as_deref().unwrap_or("provider reported failure");
            handle_terminal_failure(state, &job, message).await?;
            Ok(ReconcileOutcome::Failed)
        }
        TaskPhase::Complete if !status.variants.is_empty() => {
            reconcile_variants(state, &job, task_id, status).await
        }
        TaskPhase::Complete => {
            // Complete with no variants: keep the job eligible for the poll
            // sweep instead of completing an order with zero songs
            tracing::warn!(task_id, job_id = %job.id, "Task complete but payload carries no variants");
            Ok(ReconcileOutcome::StillProcessing)
        }
        TaskPhase::Processing => Ok(ReconcileOutcome::StillProcessing),
    }
}

async fn reconcile_variants(
    state: &AppState,
    job: &Job,
    task_id: &str,
    status: &TaskStatus,
) -> Result<ReconcileOutcome> {
    let release_at = release_schedule(state, job).await?;

    let mut persisted = 0usize;
    let mut first_audio_url: Option<String> = None;

    for (index, variant) in status.variants.iter().take(VARIANTS_PER_JOB as usize).enumerate() {
        let variant_no = (index + 1) as i64;

        let clip_id = match &variant.clip_id {
            Some(id) => id.clone(),
            None => {
                // Deterministic fallback keeps (task, clip) uniqueness intact
                let fallback = format!("{}-{}", task_id, variant_no);
                tracing::warn!(task_id, variant_no, clip_id = %fallback, "Variant without clip id, using fallback");
                fallback
            }
        };

        if let Err(e) = state.fetcher.fetch_and_validate(&variant.audio_url, MIN_SONG_BYTES).await {
            // Variant-scoped skip: one bad artifact never blocks its sibling
            tracing::error!(
                task_id,
                variant_no,
                audio_url = %variant.audio_url,
                error = %e,
                "Variant failed integrity validation, skipping"
            );
            continue;
        }

        let song = db::songs::upsert_song(
            &state.db,
            &SongUpsert {
                order_id: job.order_id,
                variant: variant_no,
                audio_url: variant.audio_url.clone(),
                cover_url: variant.cover_url.clone(),
                duration_secs: variant.duration_secs,
                clip_id: clip_id.clone(),
                release_at: release_at.clone(),
            },
        )
        .await?;
        db::generations::upsert_generation(
            &state.db,
            task_id,
            &clip_id,
            song.id,
            job.order_id,
            "completed",
        )
        .await?;

        persisted += 1;
        first_audio_url.get_or_insert_with(|| variant.audio_url.clone());

        state.event_bus.emit(PipelineEvent::SongReady {
            order_id: job.order_id,
            song_id: song.id,
            variant: variant_no,
            timestamp: Utc::now(),
        });
    }

    if persisted == 0 {
        tracing::error!(task_id, job_id = %job.id, "Every variant failed validation, job left for the poll sweep");
        return Ok(ReconcileOutcome::StillProcessing);
    }

    db::jobs::set_status(&state.db, job.id, JobStatus::Completed).await?;
    if let Some(audio_url) = &first_audio_url {
        db::jobs::set_audio_url(&state.db, job.id, audio_url).await?;
        let repaired = db::songs::backfill_missing_audio(&state.db, job.order_id, audio_url).await?;
        if repaired > 0 {
            tracing::warn!(job_id = %job.id, repaired, "Backfilled songs missing an audio URL");
        }
    }

    tracing::info!(task_id, job_id = %job.id, songs = persisted, "Task reconciled, job completed");
    state.event_bus.emit(PipelineEvent::JobCompleted {
        job_id: job.id,
        order_id: job.order_id,
        songs: persisted,
        timestamp: Utc::now(),
    });

    Ok(ReconcileOutcome::Completed { songs: persisted })
}

/// Release timestamp from the order's plan tier SLA, fixed at first
/// reconciliation (replays keep the original via the upsert's COALESCE)
async fn release_schedule(state: &AppState, job: &Job) -> Result<Option<String>> {
    let plan = db::orders::get_order(&state.db, job.order_id)
        .await?
        .map(|o| o.plan)
        .unwrap_or(PlanTier::Standard);
    Ok(Some((Utc::now() + Duration::hours(plan.release_delay_hours())).to_rfc3339()))
}

async fn handle_terminal_failure(state: &AppState, job: &Job, message: &str) -> Result<()> {
    if job.status.is_terminal() {
        tracing::debug!(job_id = %job.id, status = %job.status, "Terminal job, failure report ignored");
        return Ok(());
    }

    // The counter never passes the ceiling: the final failure is recorded
    // without an increment
    if job.retry_count >= AUDIO_RETRY_CEILING {
        let error =
            format!("generation failed after {} attempts: {}", job.retry_count + 1, message);
        tracing::error!(job_id = %job.id, retry_count = job.retry_count, "Retry ceiling reached, job failed");
        db::jobs::mark_failed(&state.db, job.id, &error).await?;
        state.event_bus.emit(PipelineEvent::JobFailed {
            job_id: job.id,
            order_id: job.order_id,
            error,
            timestamp: Utc::now(),
        });
        return Ok(());
    }

    let retry_count = db::jobs::increment_retry(&state.db, job.id).await?;
    tracing::warn!(job_id = %job.id, retry_count, error = message, "Provider failure, re-dispatching");
    dispatch::run_dispatch(state, job.id).await
}
