use axum::body::{to_bytes, Body};
use axum::Router;
use http::{Request, StatusCode};
use kangklip_api::app::AppState;
use kangklip_api::config::environment::AppConfig;
use kangklip_api::infra::InfraClients;
use kangklip_api::module::job::crud;
use kangklip_api::module::job::model::JobRecord;
use kangklip_api::module::job::schema::{JobStage, JobStatus};
use kangklip_api::service::{job_id_service, token_service};
use serde_json::Value;
use tower::util::ServiceExt;

pub fn test_config() -> AppConfig {
    AppConfig {
        rust_env: "test".to_string(),
        api_host: "127.0.0.1".to_string(),
        api_port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        redis_url: None,
        // Port 9 is closed; fabric calls fail fast instead of hanging.
        nosana_api_base: "http://127.0.0.1:9".to_string(),
        nosana_api_key: "test-key".to_string(),
        nosana_worker_image: "kangklip/worker:test".to_string(),
        nosana_market: "market-test".to_string(),
        nosana_gpu_model: "3080".to_string(),
        r2_endpoint: None,
        r2_bucket: None,
        r2_access_key_id: None,
        r2_secret_access_key: None,
        callback_base_url: "http://127.0.0.1:8000".to_string(),
        callback_token: "callback-secret".to_string(),
        llm_api_base: "http://127.0.0.1:9".to_string(),
        llm_model_name: "clip-llm".to_string(),
        llm_api_key: None,
        llm_timeout_seconds: 120,
        solana_rpc_url: None,
        usdc_mint: None,
        treasury_address: None,
        credits_program_id: None,
        spender_keypair: None,
        chain_confirm_timeout_seconds: 1,
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config(), InfraClients::disabled())
}

pub async fn seed_job(
    state: &AppState,
    status: JobStatus,
    r2_prefix: Option<&str>,
) -> (String, String) {
    let job_id = job_id_service::generate_job_id();
    let job_token = token_service::generate_secret_hex();
    let record = JobRecord {
        job_id: job_id.clone(),
        job_token: job_token.clone(),
        status,
        stage: if status == JobStatus::Succeeded {
            JobStage::Done
        } else {
            JobStage::Download
        },
        progress: if status == JobStatus::Succeeded { 100 } else { 0 },
        r2_prefix: r2_prefix.map(ToOwned::to_owned),
        nosana_run_id: Some("run-test".to_string()),
        start_error: None,
        error: None,
        market_cache: None,
        created_at: 0,
        updated_at: 0,
    };
    crud::put_job(state, &record)
        .await
        .expect("seed job write failed");
    (job_id, job_token)
}

pub async fn send_request(
    app: Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request build failed"),
        None => builder.body(Body::empty()).expect("request build failed"),
    };
    let response = app.oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read failed");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response was not json")
    };
    (status, value)
}

pub async fn post_json(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: Value,
) -> (StatusCode, Value) {
    send_request(app, "POST", uri, headers, Some(body)).await
}

pub async fn get(app: Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    send_request(app, "GET", uri, headers, None).await
}
