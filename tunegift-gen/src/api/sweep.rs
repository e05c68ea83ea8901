//! Manual poll-sweep trigger

use axum::{extract::State, routing::post, Json, Router};

use crate::error::ApiResult;
use crate::pipeline::poll::{self, SweepSummary};
use crate::AppState;

pub fn sweep_routes() -> Router<AppState> {
    Router::new().route("/sweep", post(run_sweep))
}

/// POST /sweep - run one poll sweep now, returns the tally
async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepSummary>> {
    let summary = poll::run_sweep(&state).await?;
    Ok(Json(summary))
}
