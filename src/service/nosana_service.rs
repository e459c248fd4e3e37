use crate::config::environment::AppConfig;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

const START_POLL_ATTEMPTS: u32 = 30;
const START_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PASSTHROUGH_PREFIXES: [&str; 3] = ["ASR_", "RENDER_", "CAPTION_"];

/// Advisory probe of the market's image cache. Callers treat failures as
/// missing information, never as a submission gate.
pub async fn check_market_cache(http: &Client, config: &AppConfig) -> Result<Value, String> {
    let url = format!(
        "{}/markets/{}/cache",
        config.nosana_api_base.trim_end_matches('/'),
        config.nosana_market
    );
    let response = http
        .get(url)
        .bearer_auth(&config.nosana_api_key)
        .query(&[("image", config.nosana_worker_image.as_str())])
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("market cache probe failed: {e}"))?;
    if !response.status().is_success() {
        return Err(format!(
            "market cache probe returned status {}",
            response.status()
        ));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| format!("market cache probe decode failed: {e}"))
}

/// Submits a one-replica deployment and returns the fabric run id.
pub async fn submit_deployment(
    http: &Client,
    config: &AppConfig,
    job_id: &str,
    worker_env: &BTreeMap<String, String>,
) -> Result<String, String> {
    let url = format!(
        "{}/deployments",
        config.nosana_api_base.trim_end_matches('/')
    );
    let body = json!({
        "name": job_id,
        "market": config.nosana_market,
        "image": config.nosana_worker_image,
        "gpu": config.nosana_gpu_model,
        "replicas": 1,
        "env": worker_env,
    });
    let response = http
        .post(url)
        .bearer_auth(&config.nosana_api_key)
        .json(&body)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("deployment submission failed for {job_id}: {e}"))?;
    if !response.status().is_success() {
        return Err(format!(
            "deployment submission for {job_id} returned status {}",
            response.status()
        ));
    }
    let payload = response
        .json::<Value>()
        .await
        .map_err(|e| format!("deployment response decode failed for {job_id}: {e}"))?;
    payload
        .get("id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| format!("deployment response missing run id for {job_id}"))
}

/// Polls the deployment while it prepares and issues the start command once
/// it reports ready. Bounded at 30 polls of 2s.
pub async fn start_deployment_when_ready(
    http: &Client,
    config: &AppConfig,
    run_id: &str,
) -> Result<(), String> {
    let base = config.nosana_api_base.trim_end_matches('/');
    for _ in 0..START_POLL_ATTEMPTS {
        let response = http
            .get(format!("{base}/deployments/{run_id}"))
            .bearer_auth(&config.nosana_api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("deployment poll failed for {run_id}: {e}"))?;
        if !response.status().is_success() {
            return Err(format!(
                "deployment poll for {run_id} returned status {}",
                response.status()
            ));
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| format!("deployment poll decode failed for {run_id}: {e}"))?;
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_ascii_uppercase();
        match status.as_str() {
            "CREATING" | "PENDING" | "QUEUED" | "UNKNOWN" => sleep(START_POLL_INTERVAL).await,
            "DRAFT" | "READY" => return issue_start(http, config, run_id).await,
            "RUNNING" | "STARTED" => return Ok(()),
            other => {
                return Err(format!(
                    "deployment {run_id} entered {other} before start"
                ))
            }
        }
    }
    Err(format!("deployment {run_id} never became ready"))
}

async fn issue_start(http: &Client, config: &AppConfig, run_id: &str) -> Result<(), String> {
    let url = format!(
        "{}/deployments/{run_id}/start",
        config.nosana_api_base.trim_end_matches('/')
    );
    let response = http
        .post(url)
        .bearer_auth(&config.nosana_api_key)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("deployment start failed for {run_id}: {e}"))?;
    if !response.status().is_success() {
        return Err(format!(
            "deployment start for {run_id} returned status {}",
            response.status()
        ));
    }
    Ok(())
}

/// Environment handed to the worker container. A BTreeMap keeps the payload
/// deterministic.
pub fn build_worker_env(
    config: &AppConfig,
    job_id: &str,
    video_url: &str,
    clip_count: u32,
    clip_duration_seconds: u32,
    language: &str,
) -> BTreeMap<String, String> {
    let clip_seconds = clip_duration_seconds.to_string();
    let mut env = BTreeMap::new();
    env.insert("JOB_ID".to_string(), job_id.to_string());
    env.insert("VIDEO_URL".to_string(), video_url.to_string());
    env.insert("CLIP_COUNT".to_string(), clip_count.to_string());
    env.insert("MIN_CLIP_SECONDS".to_string(), clip_seconds.clone());
    env.insert("MAX_CLIP_SECONDS".to_string(), clip_seconds);
    env.insert("OUTPUT_LANGUAGE".to_string(), language.to_string());
    env.insert(
        "TRANSCRIPT_MODE".to_string(),
        "prefer_existing".to_string(),
    );
    env.insert("ASR_FALLBACK".to_string(), "true".to_string());
    env.insert("ASR_MODEL".to_string(), "base".to_string());
    if let (Some(endpoint), Some(bucket), Some(key_id), Some(secret)) = (
        config.r2_endpoint.as_ref(),
        config.r2_bucket.as_ref(),
        config.r2_access_key_id.as_ref(),
        config.r2_secret_access_key.as_ref(),
    ) {
        env.insert("R2_ENDPOINT".to_string(), endpoint.clone());
        env.insert("R2_BUCKET".to_string(), bucket.clone());
        env.insert("R2_ACCESS_KEY_ID".to_string(), key_id.clone());
        env.insert("R2_SECRET_ACCESS_KEY".to_string(), secret.clone());
    }
    env.insert("LLM_API_BASE".to_string(), config.llm_api_base.clone());
    env.insert("LLM_MODEL_NAME".to_string(), config.llm_model_name.clone());
    env.insert(
        "LLM_TIMEOUT_SECONDS".to_string(),
        config.llm_timeout_seconds.to_string(),
    );
    if let Some(key) = &config.llm_api_key {
        env.insert("LLM_API_KEY".to_string(), key.clone());
    }
    env.insert("CALLBACK_URL".to_string(), config.callback_url());
    env.insert("CALLBACK_TOKEN".to_string(), config.callback_token.clone());
    env.insert("R2_PREFIX".to_string(), format!("jobs/{job_id}/"));
    // Operator-set ASR_/RENDER_/CAPTION_ variables override the defaults.
    for (key, value) in std::env::vars() {
        if PASSTHROUGH_PREFIXES.iter().any(|p| key.starts_with(p)) {
            env.insert(key, value);
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            rust_env: "test".to_string(),
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            cors_origins: Vec::new(),
            redis_url: None,
            nosana_api_base: "http://127.0.0.1:9".to_string(),
            nosana_api_key: "key".to_string(),
            nosana_worker_image: "kangklip/worker:test".to_string(),
            nosana_market: "market-1".to_string(),
            nosana_gpu_model: "3080".to_string(),
            r2_endpoint: Some("http://127.0.0.1:9".to_string()),
            r2_bucket: Some("clips".to_string()),
            r2_access_key_id: Some("ak".to_string()),
            r2_secret_access_key: Some("sk".to_string()),
            callback_base_url: "http://api.test".to_string(),
            callback_token: "cb-secret".to_string(),
            llm_api_base: "http://llm.test".to_string(),
            llm_model_name: "clip-llm".to_string(),
            llm_api_key: None,
            llm_timeout_seconds: 120,
            solana_rpc_url: None,
            usdc_mint: None,
            treasury_address: None,
            credits_program_id: None,
            spender_keypair: None,
            chain_confirm_timeout_seconds: 30,
        }
    }

    #[test]
    fn worker_env_carries_job_and_callback_wiring() {
        let env = build_worker_env(
            &test_config(),
            "kk_01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "https://example.test/v",
            2,
            45,
            "auto",
        );
        assert_eq!(env["JOB_ID"], "kk_01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(env["MIN_CLIP_SECONDS"], "45");
        assert_eq!(env["MAX_CLIP_SECONDS"], "45");
        assert_eq!(env["CLIP_COUNT"], "2");
        assert_eq!(env["OUTPUT_LANGUAGE"], "auto");
        assert_eq!(env["CALLBACK_URL"], "http://api.test/api/callback/nosana");
        assert_eq!(env["CALLBACK_TOKEN"], "cb-secret");
        assert_eq!(env["R2_PREFIX"], "jobs/kk_01ARZ3NDEKTSV4RRFFQ69G5FAV/");
        assert_eq!(env["TRANSCRIPT_MODE"], "prefer_existing");
        assert!(!env.contains_key("LLM_API_KEY"));
    }
}
