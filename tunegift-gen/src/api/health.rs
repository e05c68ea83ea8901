//! Health endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    module: &'static str,
    version: &'static str,
    uptime_seconds: i64,
    last_error: Option<String>,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (Utc::now() - state.startup_time).num_seconds();
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        module: "tunegift-gen",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        last_error,
    })
}
