//! Job, approval and stem-request endpoints
//!
//! Triggers accept fast and do the slow work in a spawned task; the HTTP
//! response only confirms the trigger was valid and recorded.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{lyrics_stage, orchestrator, stems};
use crate::{db, AppState};

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id/regenerate", post(regenerate_lyrics))
        .route("/approvals/:order_id/approve", post(approve_lyrics))
        .route("/songs/:song_id/stems", post(request_stems))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    order_id: Uuid,
}

#[derive(Debug, Serialize)]
struct CreateJobResponse {
    job_id: Uuid,
    status: String,
}

/// POST /jobs - order-paid trigger
///
/// Validates the order and quiz synchronously (so the caller gets a real
/// 400), then runs the lyrics stage in the background.
async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let order = db::orders::get_order(&state.db, request.order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {}", request.order_id)))?;

    let job = orchestrator::ensure_job(&state, &order).await?;
    let response = CreateJobResponse { job_id: job.id, status: job.status.to_string() };

    // Fresh pending jobs start their lyrics stage now; reused in-flight jobs
    // are already somewhere further along
    if job.status == tunegift_common::db::JobStatus::Pending {
        let stage_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = lyrics_stage::run_lyrics_stage(&stage_state, &job).await {
                tracing::error!(job_id = %job.id, error = %e, "Lyrics stage failed");
                stage_state.record_error(format!("lyrics stage for job {}: {}", job.id, e)).await;
            }
        });
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /jobs/{job_id}/regenerate - manual lyrics regeneration.
/// Reuses the existing job, so no second credit deduction happens.
async fn regenerate_lyrics(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let job = db::jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {}", job_id)))?;
    if job.external_task_id.is_some() {
        return Err(ApiError::Conflict(format!(
            "job {} already dispatched audio generation",
            job_id
        )));
    }

    let stage_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = lyrics_stage::run_lyrics_stage(&stage_state, &job).await {
            tracing::error!(job_id = %job.id, error = %e, "Lyrics regeneration failed");
            stage_state.record_error(format!("lyrics regeneration for job {}: {}", job.id, e)).await;
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// POST /approvals/{order_id}/approve - operator approval, dispatches audio
async fn approve_lyrics(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    lyrics_stage::approve_and_dispatch(&state, order_id).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
struct StemRequestResponse {
    separation_id: Uuid,
    status: String,
}

/// POST /songs/{song_id}/stems - request vocal/instrumental separation
async fn request_stems(
    State(state): State<AppState>,
    Path(song_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<StemRequestResponse>)> {
    let separation = stems::request_separation(&state, song_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StemRequestResponse {
            separation_id: separation.id,
            status: separation.status.as_str().to_string(),
        }),
    ))
}
