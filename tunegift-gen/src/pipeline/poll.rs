//! Polling sweep
//!
//! Safety net under the webhook path: periodically queries the provider for
//! every in-flight task and feeds the result through the same reconciliation
//! the webhook uses. Also re-examines completed jobs that somehow lack an
//! audio URL, which recovers from a lost or rejected callback.

use serde::Serialize;
use tokio::task::JoinHandle;
use tunegift_common::Result;

use crate::db;
use crate::pipeline::reconcile::{self, ReconcileOutcome};
use crate::AppState;

/// Jobs examined per sweep
pub const POLL_BATCH_LIMIT: i64 = 50;

/// One sweep's tally
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_processing: usize,
}

/// Run one poll sweep over the in-flight jobs
pub async fn run_sweep(state: &AppState) -> Result<SweepSummary> {
    let jobs = db::jobs::find_jobs_for_poll(&state.db, POLL_BATCH_LIMIT).await?;
    let mut summary = SweepSummary { total: jobs.len(), ..Default::default() };

    for job in jobs {
        let Some(task_id) = job.external_task_id.as_deref() else {
            continue;
        };

        let status = match state.music.query_status(task_id).await {
            Ok(status) => status,
            Err(e) => {
                // Provider unreachable: leave the job for the next sweep
                tracing::warn!(job_id = %job.id, task_id, error = %e, "Status query failed");
                summary.still_processing += 1;
                continue;
            }
        };

        match reconcile::reconcile_task(state, task_id, &status).await {
            Ok(ReconcileOutcome::Completed { .. }) => summary.completed += 1,
            Ok(ReconcileOutcome::Failed) => summary.failed += 1,
            Ok(ReconcileOutcome::StillProcessing) | Ok(ReconcileOutcome::Ignored) => {
                summary.still_processing += 1;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, task_id, error = %e, "Reconciliation failed during sweep");
                state.record_error(format!("sweep reconcile for task {}: {}", task_id, e)).await;
                summary.still_processing += 1;
            }
        }
    }

    if summary.total > 0 {
        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            still_processing = summary.still_processing,
            "Poll sweep finished"
        );
    }
    Ok(summary)
}

/// Spawn the interval scheduler around [`run_sweep`]
pub fn spawn_poll_scheduler(state: AppState, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_secs, "Poll scheduler started");

        loop {
            interval.tick().await;
            if let Err(e) = run_sweep(&state).await {
                tracing::error!(error = %e, "Poll sweep failed");
                state.record_error(format!("poll sweep: {}", e)).await;
            }
        }
    })
}
