//! HTTP handler tests via tower::ServiceExt::oneshot, no listening socket.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use tunegift_common::db::{JobStatus, PlanTier};
use tunegift_gen::db;
use tunegift_gen::pipeline::{lyrics_stage, orchestrator, reconcile};
use tunegift_gen::test_support::{completed_status, seed_paid_order, test_harness};
use tunegift_gen::build_router;

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_job_accepts_paid_order() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    let app = build_router(harness.state.clone());

    let response =
        app.oneshot(post_json("/jobs", json!({"order_id": order.id}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = response_json(response).await;
    assert!(body.get("job_id").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn create_job_rejects_unpaid_order() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    sqlx::query("UPDATE orders SET status = 'pending' WHERE id = ?")
        .bind(order.id.to_string())
        .execute(&harness.state.db)
        .await
        .unwrap();

    let app = build_router(harness.state.clone());
    let response =
        app.oneshot(post_json("/jobs", json!({"order_id": order.id}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn create_job_unknown_order_is_404() {
    let harness = test_harness().await;
    let app = build_router(harness.state.clone());

    let response = app
        .oneshot(post_json("/jobs", json!({"order_id": uuid::Uuid::new_v4()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn music_webhook_always_acks_200() {
    let harness = test_harness().await;

    // Junk JSON, empty object, and a non-JSON body all get the same ack
    for body in [Body::from("{\"weird\": [1,2"), Body::from("{}"), Body::from("not json at all")] {
        let app = build_router(harness.state.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/music")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let ack = response_json(response).await;
        assert_eq!(ack["status"], "received");
    }
}

#[tokio::test]
async fn music_webhook_reconciles_real_payload() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
    lyrics_stage::run_lyrics_stage(&harness.state, &job).await.unwrap();
    lyrics_stage::approve_and_dispatch(&harness.state, order.id).await.unwrap();
    let task_id = db::jobs::get_job(&harness.state.db, job.id)
        .await
        .unwrap()
        .unwrap()
        .external_task_id
        .unwrap();

    let payload = json!({
        "code": 200,
        "data": {
            "task_id": task_id,
            "status": "complete",
            "clips": [
                {"audio_url": "https://cdn.test/a.mp3", "clip_id": "c-1", "duration": 180.0},
                {"audio_url": "https://cdn.test/b.mp3", "clip_id": "c-2", "duration": 185.0}
            ]
        }
    });

    let app = build_router(harness.state.clone());
    let response = app.oneshot(post_json("/webhooks/music", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        db::jobs::get_job(&harness.state.db, job.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(db::songs::list_for_order(&harness.state.db, order.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn stems_webhook_always_acks_200() {
    let harness = test_harness().await;
    let app = build_router(harness.state.clone());

    let response = app
        .oneshot(post_json("/webhooks/stems", json!({"task_id": "unknown"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stems_webhook_resolves_by_song_id_query() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
    lyrics_stage::run_lyrics_stage(&harness.state, &job).await.unwrap();
    lyrics_stage::approve_and_dispatch(&harness.state, order.id).await.unwrap();
    let task_id = db::jobs::get_job(&harness.state.db, job.id)
        .await
        .unwrap()
        .unwrap()
        .external_task_id
        .unwrap();
    reconcile::reconcile_task(&harness.state, &task_id, &completed_status(1)).await.unwrap();
    let song = db::songs::list_for_order(&harness.state.db, order.id).await.unwrap().remove(0);
    tunegift_gen::pipeline::stems::request_separation(&harness.state, song.id).await.unwrap();

    // Identifier-free payload: only the song_id query param can route it
    let payload = json!({
        "vocal_url": "https://cdn.test/v.mp3",
        "instrumental_url": "https://cdn.test/i.mp3"
    });
    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(post_json(&format!("/webhooks/stems?song_id={}", song.id), payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let song = db::songs::get_song(&harness.state.db, song.id).await.unwrap().unwrap();
    assert!(song.vocals_url.is_some());
    assert!(song.instrumental_url.is_some());
}

#[tokio::test]
async fn sweep_endpoint_returns_summary() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
    lyrics_stage::run_lyrics_stage(&harness.state, &job).await.unwrap();
    lyrics_stage::approve_and_dispatch(&harness.state, order.id).await.unwrap();
    let task_id = db::jobs::get_job(&harness.state.db, job.id)
        .await
        .unwrap()
        .unwrap()
        .external_task_id
        .unwrap();
    harness.music.set_status(&task_id, completed_status(2));

    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(Request::builder().method("POST").uri("/sweep").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let summary = response_json(response).await;
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["completed"], 1);
}

#[tokio::test]
async fn approve_endpoint_dispatches_audio() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
    lyrics_stage::run_lyrics_stage(&harness.state, &job).await.unwrap();

    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/approvals/{}/approve", order.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.music.submissions(), 1);
}

#[tokio::test]
async fn stem_request_endpoint() {
    let harness = test_harness().await;
    let order = seed_paid_order(&harness.state.db, PlanTier::Standard).await;
    let job = orchestrator::ensure_job(&harness.state, &order).await.unwrap();
    lyrics_stage::run_lyrics_stage(&harness.state, &job).await.unwrap();
    lyrics_stage::approve_and_dispatch(&harness.state, order.id).await.unwrap();
    let task_id = db::jobs::get_job(&harness.state.db, job.id)
        .await
        .unwrap()
        .unwrap()
        .external_task_id
        .unwrap();
    reconcile::reconcile_task(&harness.state, &task_id, &completed_status(1)).await.unwrap();
    let song = db::songs::list_for_order(&harness.state.db, order.id).await.unwrap().remove(0);

    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/songs/{}/stems", song.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = response_json(response).await;
    assert_eq!(body["status"], "processing");
}

#[tokio::test]
async fn health_shape() {
    let harness = test_harness().await;
    harness.state.record_error("something earlier").await;

    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = response_json(response).await;
    assert_eq!(health["module"], "tunegift-gen");
    assert!(health.get("version").is_some());
    assert!(health["uptime_seconds"].as_i64().unwrap() >= 0);
    assert_eq!(health["last_error"], "something earlier");
}
