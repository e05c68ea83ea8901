//! Provider callback endpoints
//!
//! Both webhooks acknowledge 200 no matter what, including on malformed
//! JSON. A non-200 would put the provider's retry scheduler in charge of our
//! duplicate-work rate; the poll sweep is the recovery path for anything a
//! callback failed to persist, and failures are logged with the task id so
//! a lost result can be traced.

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::pipeline::{reconcile, stems};
use crate::AppState;

pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/music", post(music_callback))
        .route("/webhooks/stems", post(stems_callback))
}

fn ack() -> Json<Value> {
    Json(json!({"status": "received"}))
}

/// POST /webhooks/music - music-provider completion callback
async fn music_callback(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    // Bytes instead of Json<_> so malformed payloads still get the 200 ack
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Music callback with unparseable body");
            return ack();
        }
    };

    match reconcile::reconcile_payload(&state, &payload).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Music callback reconciled");
        }
        Err(e) => {
            tracing::error!(error = %e, "Music callback reconciliation failed, poll sweep will recover");
            state.record_error(format!("music callback: {}", e)).await;
        }
    }
    ack()
}

#[derive(Debug, Deserialize)]
struct StemCallbackQuery {
    separation_id: Option<Uuid>,
    song_id: Option<Uuid>,
}

/// POST /webhooks/stems - stem-provider completion callback
async fn stems_callback(
    State(state): State<AppState>,
    Query(query): Query<StemCallbackQuery>,
    body: Bytes,
) -> Json<Value> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Stem callback with unparseable body");
            return ack();
        }
    };

    if let Err(e) = stems::handle_callback(&state, query.separation_id, query.song_id, &payload).await
    {
        tracing::error!(error = %e, "Stem callback handling failed");
        state.record_error(format!("stem callback: {}", e)).await;
    }
    ack()
}
