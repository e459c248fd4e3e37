mod common;

use common::{get, post_json, seed_job, test_state};
use http::StatusCode;
use kangklip_api::app::build_router;
use kangklip_api::module::job::schema::JobStatus;
use serde_json::json;

const CALLBACK: &str = "/api/callback/nosana";

#[tokio::test]
async fn create_job_records_failure_when_dispatch_is_unreachable() {
    let state = test_state();
    let app = build_router(state);
    let (status, body) = post_json(
        app,
        "/api/jobs",
        &[],
        json!({
            "video_url": "https://example.test/v",
            "clip_duration_seconds": 45,
            "clip_count": 2,
            "language": "auto"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "DISPATCH_FAILED");
}

#[tokio::test]
async fn create_job_validates_the_request_body() {
    let state = test_state();
    let app = build_router(state);

    let (status, body) = post_json(
        app.clone(),
        "/api/jobs",
        &[],
        json!({
            "video_url": "https://example.test/v",
            "clip_duration_seconds": 29,
            "clip_count": 2
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_CLIP_DURATION");

    let (status, body) = post_json(
        app.clone(),
        "/api/jobs",
        &[],
        json!({
            "video_url": "https://example.test/v",
            "clip_duration_seconds": 45,
            "clip_count": 6
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_CLIP_COUNT");

    let (status, body) = post_json(
        app,
        "/api/jobs",
        &[],
        json!({
            "video_url": "nonsense",
            "clip_duration_seconds": 45,
            "clip_count": 2,
            "language": "en"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_VIDEO_URL");
}

#[tokio::test]
async fn job_status_is_public_and_hides_the_job_token() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Queued, None).await;
    let app = build_router(state);

    let (status, body) = get(app.clone(), &format!("/api/jobs/{job_id}"), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_id"], job_id);
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(body["stage"], "DOWNLOAD");
    assert_eq!(body["progress"], 0);
    assert!(body.get("job_token").is_none());

    let (status, _) = get(
        app.clone(),
        "/api/jobs/kk_00000000000000000000000000",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(app, "/api/jobs/not-a-job-id", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_JOB_ID");
}

#[tokio::test]
async fn callback_requires_the_shared_secret() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Queued, None).await;
    let app = build_router(state);

    let payload = json!({"job_id": job_id, "status": "RUNNING"});
    let (status, _) = post_json(app.clone(), CALLBACK, &[], payload.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_json(
        app,
        CALLBACK,
        &[("x-callback-token", "wrong")],
        payload,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn callback_advances_the_lifecycle_and_rejects_regressions() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Queued, None).await;
    let app = build_router(state);
    let auth = [("x-callback-token", "callback-secret")];

    let (status, body) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({"job_id": job_id, "status": "RUNNING", "stage": "TRANSCRIPT", "progress": 30}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, view) = get(app.clone(), &format!("/api/jobs/{job_id}"), &[]).await;
    assert_eq!(view["status"], "RUNNING");
    assert_eq!(view["stage"], "TRANSCRIPT");
    assert_eq!(view["progress"], 30);

    // A stale stage report is dropped, not an error.
    let (status, _) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({"job_id": job_id, "status": "RUNNING", "stage": "DOWNLOAD", "progress": 45}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = get(app.clone(), &format!("/api/jobs/{job_id}"), &[]).await;
    assert_eq!(view["stage"], "TRANSCRIPT");
    assert_eq!(view["progress"], 45);

    let (status, _) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({
            "job_id": job_id,
            "status": "SUCCEEDED",
            "r2_prefix": format!("jobs/{job_id}/")
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = get(app.clone(), &format!("/api/jobs/{job_id}"), &[]).await;
    assert_eq!(view["status"], "SUCCEEDED");
    assert_eq!(view["stage"], "DONE");
    assert_eq!(view["progress"], 100);

    // Terminal states never regress.
    let (status, body) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({"job_id": job_id, "status": "RUNNING"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_STATE_TRANSITION");

    let (status, _) = post_json(
        app,
        CALLBACK,
        &auth,
        json!({"job_id": job_id, "status": "FAILED"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_callback_reports_done_stage_and_error() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Running, None).await;
    let app = build_router(state);

    let (status, _) = post_json(
        app.clone(),
        CALLBACK,
        &[("x-callback-token", "callback-secret")],
        json!({"job_id": job_id, "status": "FAILED", "error": "asr_timeout"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = get(app, &format!("/api/jobs/{job_id}"), &[]).await;
    assert_eq!(view["status"], "FAILED");
    assert_eq!(view["stage"], "DONE");
    assert_eq!(view["progress"], 100);
    assert_eq!(view["error"], "asr_timeout");
}

#[tokio::test]
async fn callback_clamps_progress_and_validates_input() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Queued, None).await;
    let app = build_router(state);
    let auth = [("x-callback-token", "callback-secret")];

    let (status, _) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({"job_id": job_id, "status": "RUNNING", "progress": 400}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = get(app.clone(), &format!("/api/jobs/{job_id}"), &[]).await;
    assert_eq!(view["progress"], 100);

    let (status, body) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({"job_id": job_id, "status": "EXPLODED"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_STATUS");

    let (status, body) = post_json(
        app.clone(),
        CALLBACK,
        &auth,
        json!({"job_id": "bogus", "status": "RUNNING"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_JOB_ID");

    let (status, _) = post_json(
        app,
        CALLBACK,
        &auth,
        json!({"job_id": "kk_00000000000000000000000000", "status": "RUNNING"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn results_is_gated_by_job_token_and_status() {
    let state = test_state();
    let (queued_id, queued_token) = seed_job(&state, JobStatus::Queued, None).await;
    let (done_id, done_token) =
        seed_job(&state, JobStatus::Succeeded, Some("jobs/prefix/")).await;
    let (bare_id, bare_token) = seed_job(&state, JobStatus::Succeeded, None).await;
    let app = build_router(state);

    let (status, _) = get(app.clone(), &format!("/api/jobs/{queued_id}/results"), &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(
        app.clone(),
        &format!("/api/jobs/{queued_id}/results"),
        &[("x-job-token", "tampered")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(
        app.clone(),
        &format!("/api/jobs/{queued_id}/results"),
        &[("x-job-token", queued_token.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "JOB_NOT_COMPLETED");

    // Succeeded without a prefix is a server-side invariant break.
    let (status, body) = get(
        app.clone(),
        &format!("/api/jobs/{bare_id}/results"),
        &[("x-job-token", bare_token.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_code"], "MISSING_R2_PREFIX");

    // Succeeded with a prefix but no object store configured.
    let (status, body) = get(
        app,
        &format!("/api/jobs/{done_id}/results"),
        &[("x-job-token", done_token.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "OBJECT_STORE_UNAVAILABLE");
}

#[tokio::test]
async fn health_reports_the_store_mode() {
    let app = build_router(test_state());
    let (status, body) = get(app, "/api/health", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}
