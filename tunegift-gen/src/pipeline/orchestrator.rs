//! Job orchestrator
//!
//! `ensure_job` is the single entry point from an order-paid trigger. It is
//! idempotent: repeated triggers for the same order converge on the one
//! non-failed Job, and only a genuinely new Job costs a generation credit.

use chrono::Utc;
use tunegift_common::db::{Job, JobStatus, Order, OrderStatus, Quiz};
use tunegift_common::events::PipelineEvent;
use tunegift_common::{Error, Result};
use uuid::Uuid;

use crate::db;
use crate::services::lyrics_client;
use crate::AppState;

/// Credits one generation job costs
pub const GENERATION_CREDIT_COST: i64 = 1;

/// Ledger account charged for generation work
pub const GENERATION_CREDIT_ACCOUNT: &str = "generation";

/// Languages the lyrics provider is prompted in
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "it", "pt", "ja"];

/// Structural validation of the creative brief, before any Job exists.
/// A quiz that cannot produce a sensible prompt is rejected here so no
/// credit is spent and no provider is called.
pub fn validate_quiz(quiz: &Quiz) -> Result<()> {
    fn present(field: &Option<String>) -> bool {
        field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
    }

    if !present(&quiz.recipient) {
        return Err(Error::InvalidInput("quiz missing recipient".to_string()));
    }
    if !present(&quiz.relationship) {
        return Err(Error::InvalidInput("quiz missing relationship".to_string()));
    }
    if !present(&quiz.style) {
        return Err(Error::InvalidInput("quiz missing style".to_string()));
    }

    if let Some(language) = quiz.language.as_deref() {
        if !SUPPORTED_LANGUAGES.contains(&language) {
            return Err(Error::InvalidInput(format!("unsupported language: {}", language)));
        }
    }

    let has_story = present(&quiz.message)
        || lyrics_client::legacy_story(&quiz.answers).is_some();
    if !has_story {
        return Err(Error::InvalidInput(
            "quiz missing message and legacy story fields".to_string(),
        ));
    }

    Ok(())
}

/// Find or create the Job for a paid order.
///
/// An existing non-failed Job is returned unchanged; a `failed` Job is the
/// only kind a new one may replace. Credit deduction failure degrades to an
/// uncharged job rather than blocking the customer's order.
pub async fn ensure_job(state: &AppState, order: &Order) -> Result<Job> {
    if order.status != OrderStatus::Paid {
        return Err(Error::InvalidInput(format!(
            "order {} is {}, not paid",
            order.id, order.status
        )));
    }

    let quiz = db::orders::get_quiz(&state.db, order.quiz_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("quiz {} for order {}", order.quiz_id, order.id)))?;
    validate_quiz(&quiz)?;

    if let Some(existing) = db::jobs::find_active_job_for_order(&state.db, order.id).await? {
        tracing::info!(
            order_id = %order.id,
            job_id = %existing.id,
            status = %existing.status,
            "Reusing existing job for order"
        );
        return Ok(existing);
    }

    let job = Job {
        id: Uuid::new_v4(),
        order_id: order.id,
        quiz_id: order.quiz_id,
        status: JobStatus::Pending,
        title: None,
        lyrics: None,
        external_task_id: None,
        retry_count: 0,
        audio_url: None,
        error: None,
    };
    db::jobs::insert_job(&state.db, &job).await?;

    match db::credits::deduct(&state.db, GENERATION_CREDIT_ACCOUNT, GENERATION_CREDIT_COST, order.id)
        .await
    {
        Ok(()) => {
            tracing::info!(order_id = %order.id, cost = GENERATION_CREDIT_COST, "Generation credit deducted");
        }
        Err(e) => {
            // Uncharged mode: the customer's song is never blocked on accounting
            tracing::error!(order_id = %order.id, error = %e, "Credit deduction failed, continuing uncharged");
            state.record_error(format!("credit deduction failed for order {}: {}", order.id, e)).await;
        }
    }

    tracing::info!(order_id = %order.id, job_id = %job.id, "Job created for paid order");
    state.event_bus.emit(PipelineEvent::JobCreated {
        job_id: job.id,
        order_id: order.id,
        timestamp: Utc::now(),
    });

    Ok(job)
}
