//! Lyrics generation stage
//!
//! Produces the song text and the approval gate in front of audio dispatch.
//! Whatever happens here, a paid order always ends up with an operator-visible
//! trace: an approval row, or a failed job carrying the provider's error.

use chrono::{Duration, Utc};
use tunegift_common::db::{ApprovalStatus, Job, JobStatus, Quiz};
use tunegift_common::events::PipelineEvent;
use tunegift_common::{Error, Result};

use crate::db;
use crate::pipeline::dispatch;
use crate::services::lyrics_client::SongBrief;
use crate::services::lyrics_parser;
use crate::AppState;

/// Operator review window before an approval goes stale
pub const APPROVAL_WINDOW_HOURS: i64 = 72;

/// Placeholder persisted when the provider fails, so the approval row has
/// content for the operator to look at
pub const FAILED_LYRICS_PLACEHOLDER: &str = "Lyrics generation failed. Manual intervention required.";

fn approval_expiry() -> String {
    (Utc::now() + Duration::hours(APPROVAL_WINDOW_HOURS)).to_rfc3339()
}

/// A customer-pre-approved lyrics override carried in the quiz answers
pub fn approved_lyrics_override(quiz: &Quiz) -> Option<String> {
    quiz.answers
        .get("approved_lyrics")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

/// Run the lyrics stage for a freshly created or regenerating job.
///
/// Pre-approved override: skip the provider, create an already-approved
/// approval and dispatch audio immediately. Otherwise call the provider,
/// gate the result behind a pending approval, and on failure persist a
/// placeholder plus a pending approval so the order is never silently lost.
pub async fn run_lyrics_stage(state: &AppState, job: &Job) -> Result<()> {
    let quiz = db::orders::get_quiz(&state.db, job.quiz_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("quiz {}", job.quiz_id)))?;

    db::jobs::set_status(&state.db, job.id, JobStatus::Processing).await?;

    if let Some(lyrics) = approved_lyrics_override(&quiz) {
        tracing::info!(job_id = %job.id, "Pre-approved lyrics override present, skipping provider");
        let title = quiz
            .recipient
            .as_deref()
            .map(|r| format!("Song for {}", r))
            .unwrap_or_else(|| "Your Song".to_string());

        db::jobs::set_lyrics(&state.db, job.id, Some(&title), &lyrics, JobStatus::Processing)
            .await?;
        db::approvals::upsert_for_order(
            &state.db,
            job.order_id,
            job.id,
            &lyrics,
            ApprovalStatus::Approved,
            &approval_expiry(),
        )
        .await?;

        state.event_bus.emit(PipelineEvent::LyricsGenerated {
            job_id: job.id,
            order_id: job.order_id,
            auto_approved: true,
            timestamp: Utc::now(),
        });

        return dispatch::run_dispatch(state, job.id).await;
    }

    let brief = SongBrief::from_quiz(&quiz);
    match state.lyrics.generate(&brief).await {
        Ok(generated) => {
            let sections = lyrics_parser::parse(&generated.lyrics);
            if sections.is_empty() {
                // Unparseable output reads as a provider failure: the text
                // cannot drive a structured render
                return fail_lyrics(
                    state,
                    job,
                    &format!("provider returned unstructured lyrics for '{}'", generated.title),
                )
                .await;
            }

            db::jobs::set_lyrics(
                &state.db,
                job.id,
                Some(&generated.title),
                &generated.lyrics,
                JobStatus::Processing,
            )
            .await?;
            db::approvals::upsert_for_order(
                &state.db,
                job.order_id,
                job.id,
                &generated.lyrics,
                ApprovalStatus::Pending,
                &approval_expiry(),
            )
            .await?;

            tracing::info!(
                job_id = %job.id,
                title = %generated.title,
                sections = sections.len(),
                "Lyrics generated, awaiting approval"
            );
            state.event_bus.emit(PipelineEvent::LyricsGenerated {
                job_id: job.id,
                order_id: job.order_id,
                auto_approved: false,
                timestamp: Utc::now(),
            });
            Ok(())
        }
        Err(e) => fail_lyrics(state, job, &e.to_string()).await,
    }
}

async fn fail_lyrics(state: &AppState, job: &Job, error: &str) -> Result<()> {
    tracing::error!(job_id = %job.id, error, "Lyrics stage failed");

    // The error text rides inside the placeholder so the operator sees it
    // directly in the approval queue
    let placeholder = format!("{}\nError: {}", FAILED_LYRICS_PLACEHOLDER, error);

    db::jobs::set_lyrics(&state.db, job.id, None, &placeholder, JobStatus::Processing).await?;
    db::jobs::mark_failed(&state.db, job.id, error).await?;

    // The pending approval keeps the order visible to operators
    db::approvals::upsert_for_order(
        &state.db,
        job.order_id,
        job.id,
        &placeholder,
        ApprovalStatus::Pending,
        &approval_expiry(),
    )
    .await?;

    state.event_bus.emit(PipelineEvent::LyricsFailed {
        job_id: job.id,
        order_id: job.order_id,
        error: error.to_string(),
        timestamp: Utc::now(),
    });
    Ok(())
}

/// Manual operator approval: flip the approval and dispatch audio
pub async fn approve_and_dispatch(state: &AppState, order_id: uuid::Uuid) -> Result<()> {
    let approval = db::approvals::get_by_order(&state.db, order_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("approval for order {}", order_id)))?;

    let job = db::jobs::get_job(&state.db, approval.job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("job {}", approval.job_id)))?;
    if job.status == JobStatus::Failed {
        return Err(Error::InvalidInput(format!(
            "job {} is failed, regenerate lyrics before approving",
            job.id
        )));
    }

    db::approvals::set_status(&state.db, approval.id, ApprovalStatus::Approved).await?;
    tracing::info!(order_id = %order_id, job_id = %job.id, "Lyrics approved, dispatching audio");

    dispatch::run_dispatch(state, job.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator;
    use crate::test_support::{seed_paid_order, test_harness};
    use std::sync::atomic::Ordering;
    use tunegift_common::db::PlanTier;
    use uuid::Uuid;

    fn quiz_with_answers(answers: serde_json::Value) -> Quiz {
        Quiz {
            id: Uuid::new_v4(),
            recipient: Some("Maria".to_string()),
            relationship: None,
            occasion: None,
            style: None,
            message: None,
            voice_type: None,
            language: None,
            answers,
        }
    }

    #[test]
    fn test_override_detection() {
        let quiz = quiz_with_answers(serde_json::json!({"approved_lyrics": "[Verse]\nmy words"}));
        assert_eq!(approved_lyrics_override(&quiz).as_deref(), Some("[Verse]\nmy words"));

        let quiz = quiz_with_answers(serde_json::json!({"approved_lyrics": "   "}));
        assert!(approved_lyrics_override(&quiz).is_none());

        let quiz = quiz_with_answers(serde_json::json!({}));
        assert!(approved_lyrics_override(&quiz).is_none());
    }

    #[tokio::test]
    async fn test_generated_lyrics_wait_for_approval() {
        let harness = test_harness().await;
        let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
        let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();

        run_lyrics_stage(&harness.state, &job).await.unwrap();

        let loaded = db::jobs::get_job(&harness.state.db, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert!(loaded.lyrics.is_some());

        let approval =
            db::approvals::get_by_order(&harness.state.db, order.id).await.unwrap().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);

        // No audio dispatched until the approval flips
        assert_eq!(harness.music.submissions(), 0);
    }

    #[tokio::test]
    async fn test_approval_triggers_dispatch() {
        let harness = test_harness().await;
        let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
        let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
        run_lyrics_stage(&harness.state, &job).await.unwrap();

        approve_and_dispatch(&harness.state, order.id).await.unwrap();

        let loaded = db::jobs::get_job(&harness.state.db, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::AudioProcessing);
        assert_eq!(harness.music.submissions(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_trace() {
        let harness = test_harness().await;
        let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
        let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();

        harness.lyrics.fail.store(true, Ordering::SeqCst);
        run_lyrics_stage(&harness.state, &job).await.unwrap();

        let loaded = db::jobs::get_job(&harness.state.db, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert!(loaded.error.as_deref().unwrap_or("").contains("stub lyrics failure"));
        let lyrics = loaded.lyrics.as_deref().unwrap_or("");
        assert!(lyrics.starts_with(FAILED_LYRICS_PLACEHOLDER));
        assert!(lyrics.contains("stub lyrics failure"));

        // The approval row carries the same error-bearing placeholder
        let approval =
            db::approvals::get_by_order(&harness.state.db, order.id).await.unwrap().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert!(approval.lyrics.contains("stub lyrics failure"));
    }

    #[tokio::test]
    async fn test_preapproved_override_skips_provider_and_dispatches() {
        let harness = test_harness().await;
        let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;

        sqlx::query("UPDATE quizzes SET answers = ? WHERE id = ?")
            .bind(serde_json::json!({"approved_lyrics": "[Verse]\ncustomer's own words"}).to_string())
            .bind(order.quiz_id.to_string())
            .execute(&harness.state.db)
            .await
            .unwrap();

        let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
        run_lyrics_stage(&harness.state, &job).await.unwrap();

        assert_eq!(harness.lyrics.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.music.submissions(), 1);

        let approval =
            db::approvals::get_by_order(&harness.state.db, order.id).await.unwrap().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Approved);

        let loaded = db::jobs::get_job(&harness.state.db, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::AudioProcessing);
        assert_eq!(loaded.lyrics.as_deref(), Some("[Verse]\ncustomer's own words"));
    }

    #[tokio::test]
    async fn test_approve_failed_job_rejected() {
        let harness = test_harness().await;
        let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
        let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();

        harness.lyrics.fail.store(true, Ordering::SeqCst);
        run_lyrics_stage(&harness.state, &job).await.unwrap();

        assert!(approve_and_dispatch(&harness.state, order.id).await.is_err());
        assert_eq!(harness.music.submissions(), 0);
    }
}
