mod common;

use common::{post_json, seed_job, test_state};
use http::StatusCode;
use kangklip_api::app::build_router;
use kangklip_api::module::job::crud::{self, CreditConsume};
use kangklip_api::module::job::model::{UnlockFailure, UnlockOutcomeRecord, UnlockPendingRecord};
use kangklip_api::module::job::schema::{IdempotencyTag, JobStatus};
use kangklip_api::service::unlock_service;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

fn test_wallet() -> String {
    Pubkey::new_unique().to_string()
}

#[tokio::test]
async fn consume_primitive_charges_once_per_clip() {
    let state = test_state();
    let wallet = test_wallet();

    let first = crud::try_consume_credit(&state, "kk_job", "clip.mp4", &wallet, "r1", 5)
        .await
        .unwrap();
    let CreditConsume::Outcome(first) = first else {
        panic!("expected an outcome");
    };
    assert!(first.unlocked);
    assert_eq!(first.charged_credits, 1);
    assert_eq!(first.idempotency, IdempotencyTag::New);

    // Same request id replays the recorded outcome verbatim.
    let replay = crud::try_consume_credit(&state, "kk_job", "clip.mp4", &wallet, "r1", 5)
        .await
        .unwrap();
    let CreditConsume::Outcome(replay) = replay else {
        panic!("expected an outcome");
    };
    assert_eq!(replay, first);

    // A different request id observes the unlock without a second charge.
    let other = crud::try_consume_credit(&state, "kk_job", "clip.mp4", &wallet, "r2", 5)
        .await
        .unwrap();
    let CreditConsume::Outcome(other) = other else {
        panic!("expected an outcome");
    };
    assert!(other.unlocked);
    assert_eq!(other.charged_credits, 0);
    assert_eq!(other.idempotency, IdempotencyTag::Replay);

    assert_eq!(crud::wallet_spend(&state, &wallet).await.unwrap(), 1);
}

#[tokio::test]
async fn consume_primitive_enforces_the_wallet_budget() {
    let state = test_state();
    let wallet = test_wallet();

    let first = crud::try_consume_credit(&state, "kk_job", "a.mp4", &wallet, "r1", 1)
        .await
        .unwrap();
    assert!(matches!(first, CreditConsume::Outcome(_)));

    // One credit available, one spent: a second clip cannot charge.
    let second = crud::try_consume_credit(&state, "kk_job", "b.mp4", &wallet, "r2", 1)
        .await
        .unwrap();
    assert!(matches!(second, CreditConsume::Insufficient));

    let zero = crud::try_consume_credit(&state, "kk_job", "c.mp4", &test_wallet(), "r3", 0)
        .await
        .unwrap();
    assert!(matches!(zero, CreditConsume::Insufficient));
}

#[tokio::test]
async fn concurrent_unlocks_of_one_clip_charge_at_most_once() {
    let state = test_state();
    let wallet = test_wallet();

    let mut handles = Vec::new();
    for i in 0..8 {
        let state = state.clone();
        let wallet = wallet.clone();
        handles.push(tokio::spawn(async move {
            crud::try_consume_credit(&state, "kk_job", "clip.mp4", &wallet, &format!("r{i}"), 4)
                .await
                .unwrap()
        }));
    }
    let mut charged = 0;
    let mut observed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            CreditConsume::Outcome(outcome) if outcome.charged_credits == 1 => charged += 1,
            CreditConsume::Outcome(outcome) => {
                assert!(outcome.unlocked);
                observed += 1;
            }
            CreditConsume::Insufficient => {}
        }
    }
    assert_eq!(charged, 1);
    assert_eq!(observed, 7);
    assert_eq!(crud::wallet_spend(&state, &wallet).await.unwrap(), 1);
}

#[tokio::test]
async fn unlocked_clips_replay_without_a_chain_round_trip() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let job = crud::get_job(&state, &job_id).await.unwrap().unwrap();
    let wallet = test_wallet();

    crud::set_clip_unlocked(&state, &job_id, "clip.mp4")
        .await
        .unwrap();

    let first = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap();
    assert!(first.unlocked);
    assert_eq!(first.charged_credits, 0);
    assert_eq!(first.idempotency, IdempotencyTag::Replay);

    // Replaying the same request id returns the identical body.
    let replay = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&replay).unwrap()
    );
}

#[tokio::test]
async fn charged_request_id_replays_its_original_body() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let job = crud::get_job(&state, &job_id).await.unwrap().unwrap();
    let wallet = test_wallet();

    let CreditConsume::Outcome(first) =
        crud::try_consume_credit(&state, &job_id, "clip.mp4", &wallet, "r1", 3)
            .await
            .unwrap()
    else {
        panic!("expected an outcome");
    };
    assert_eq!(first.charged_credits, 1);

    // Retrying the charging id returns its charged body, not the generic
    // already-unlocked replay.
    let replay = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap();
    assert!(replay.unlocked);
    assert_eq!(replay.charged_credits, 1);
    assert_eq!(replay.idempotency, IdempotencyTag::New);
    assert_eq!(
        serde_json::to_string(&first.to_response()).unwrap(),
        serde_json::to_string(&replay).unwrap()
    );

    // A fresh id still observes the unlock for free.
    let other = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r2")
        .await
        .unwrap();
    assert!(other.unlocked);
    assert_eq!(other.charged_credits, 0);
    assert_eq!(other.idempotency, IdempotencyTag::Replay);
    assert_eq!(crud::wallet_spend(&state, &wallet).await.unwrap(), 1);
}

#[tokio::test]
async fn burned_request_ids_replay_their_original_refusal() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let job = crud::get_job(&state, &job_id).await.unwrap().unwrap();
    let wallet = test_wallet();

    crud::put_unlock_outcome(
        &state,
        "r1",
        &UnlockOutcomeRecord::burned(&job_id, "clip.mp4", UnlockFailure::InsufficientCredits),
    )
    .await
    .unwrap();
    let err = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(err.code, "INSUFFICIENT_CREDITS");

    crud::put_unlock_outcome(
        &state,
        "r2",
        &UnlockOutcomeRecord::burned(&job_id, "clip.mp4", UnlockFailure::ChainConfirmTimeout),
    )
    .await
    .unwrap();
    let err = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r2")
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    assert_eq!(err.code, "CHAIN_CONFIRM_TIMEOUT");
}

#[tokio::test]
async fn pending_idempotency_reports_conflict() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let job = crud::get_job(&state, &job_id).await.unwrap().unwrap();

    assert!(crud::begin_unlock(&state, "r1", &job_id, "clip.mp4")
        .await
        .unwrap());

    let err = unlock_service::execute(&state, &job, &test_wallet(), "clip.mp4", "r1")
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.code, "UNLOCK_IN_PROGRESS");
}

#[tokio::test]
async fn pending_marker_recovers_a_crashed_unlock() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let job = crud::get_job(&state, &job_id).await.unwrap().unwrap();
    let wallet = test_wallet();

    crud::put_unlock_pending(
        &state,
        "r1",
        &UnlockPendingRecord {
            job_id: job_id.clone(),
            clip_file: "clip.mp4".to_string(),
            wallet: wallet.clone(),
            tx_sig: "sig".to_string(),
        },
    )
    .await
    .unwrap();

    let response = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap();
    assert!(response.unlocked);
    assert_eq!(response.charged_credits, 0);
    assert!(crud::is_clip_unlocked(&state, &job_id, "clip.mp4")
        .await
        .unwrap());
    assert!(crud::get_unlock_pending(&state, "r1")
        .await
        .unwrap()
        .is_none());

    // A marker for another clip must not leak an unlock.
    crud::put_unlock_pending(
        &state,
        "r2",
        &UnlockPendingRecord {
            job_id: job_id.clone(),
            clip_file: "other.mp4".to_string(),
            wallet: wallet.clone(),
            tx_sig: "sig".to_string(),
        },
    )
    .await
    .unwrap();
    let err = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r2")
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.code, "UNLOCK_REQUEST_MISMATCH");
}

#[tokio::test]
async fn missing_chain_client_releases_the_request_id() {
    let state = test_state();
    let (job_id, _) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let job = crud::get_job(&state, &job_id).await.unwrap().unwrap();
    let wallet = test_wallet();

    let err = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    assert_eq!(err.code, "CHAIN_UNAVAILABLE");

    // The id was not burned by an infrastructure gap; a retry gets the same
    // answer instead of a conflict.
    let err = unlock_service::execute(&state, &job, &wallet, "clip.mp4", "r1")
        .await
        .unwrap_err();
    assert_eq!(err.code, "CHAIN_UNAVAILABLE");
}

#[tokio::test]
async fn unlock_endpoint_enforces_every_gate() {
    let state = test_state();
    let (job_id, job_token) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let wallet = test_wallet();
    let auth_token = "a".repeat(64);
    crud::put_auth_token(&state, &auth_token, &wallet)
        .await
        .unwrap();
    let app = build_router(state);
    let uri = format!("/api/jobs/{job_id}/clips/clip.mp4/unlock");
    let body = json!({"unlock_request_id": "r1"});

    let (status, _) = post_json(
        app.clone(),
        "/api/jobs/kk_00000000000000000000000000/clips/clip.mp4/unlock",
        &[],
        body.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(app.clone(), &uri, &[], body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_json(
        app.clone(),
        &uri,
        &[("x-job-token", job_token.as_str())],
        body.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let both = [
        ("x-job-token", job_token.as_str()),
        ("x-auth-token", auth_token.as_str()),
    ];
    let (status, body_json) = post_json(
        app.clone(),
        &uri,
        &both,
        json!({"unlock_request_id": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body_json["error_code"], "INVALID_UNLOCK_REQUEST_ID");

    let (status, body_json) = post_json(
        app,
        &uri,
        &both,
        json!({"unlock_request_id": "x".repeat(129)}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body_json["error_code"], "INVALID_UNLOCK_REQUEST_ID");
}

#[tokio::test]
async fn download_refuses_locked_clips_with_the_fixed_body() {
    let state = test_state();
    let (job_id, job_token) = seed_job(&state, JobStatus::Succeeded, Some("jobs/p/")).await;
    let app = build_router(state);

    let (status, body) = common::get(
        app.clone(),
        &format!("/api/jobs/{job_id}/clips/clip.mp4/download"),
        &[("x-job-token", job_token.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"error": "locked"}));

    let (status, _) = common::get(
        app,
        &format!("/api/jobs/{job_id}/clips/clip.mp4/download"),
        &[("x-job-token", "wrong")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
