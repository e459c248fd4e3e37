use crate::config::environment::AppConfig;
use crate::service::chain_service::{self, ChainContext};
use crate::service::r2_service;
use object_store::aws::AmazonS3;
use redis::Client as RedisClient;
use reqwest::Client as HttpClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct InfraClients {
    pub redis: Option<RedisClient>,
    pub http: HttpClient,
    pub chain: Option<ChainContext>,
    pub r2: Option<Arc<AmazonS3>>,
}

impl InfraClients {
    /// No external clients at all; the in-memory store fallback carries the
    /// whole surface. Used by tests.
    pub fn disabled() -> Self {
        Self {
            redis: None,
            http: HttpClient::new(),
            chain: None,
            r2: None,
        }
    }
}

pub async fn init_infra(config: &AppConfig) -> Result<InfraClients, String> {
    let redis = match &config.redis_url {
        Some(url) => Some(
            RedisClient::open(url.clone()).map_err(|e| format!("redis init failed: {e}"))?,
        ),
        None => {
            warn!("REDIS_URL not set; falling back to the in-process store");
            None
        }
    };

    let http = HttpClient::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| format!("http client init failed: {e}"))?;

    let chain = build_chain_context(config)?;
    if chain.is_none() {
        warn!("chain env incomplete; credit and unlock endpoints are degraded");
    }

    let r2 = build_r2_store(config)?;
    if r2.is_none() {
        warn!("R2 env incomplete; artifact endpoints are degraded");
    }

    Ok(InfraClients {
        redis,
        http,
        chain,
        r2,
    })
}

fn build_chain_context(config: &AppConfig) -> Result<Option<ChainContext>, String> {
    let (Some(rpc_url), Some(program_id), Some(authority), Some(mint), Some(spender_raw)) = (
        config.solana_rpc_url.as_ref(),
        config.credits_program_id.as_ref(),
        config.treasury_address.as_ref(),
        config.usdc_mint.as_ref(),
        config.spender_keypair.as_ref(),
    ) else {
        return Ok(None);
    };
    let rpc = RpcClient::new_with_timeout_and_commitment(
        rpc_url.clone(),
        RPC_TIMEOUT,
        CommitmentConfig::confirmed(),
    );
    let program_id =
        Pubkey::from_str(program_id).map_err(|e| format!("invalid CREDITS_PROGRAM_ID: {e}"))?;
    let authority =
        Pubkey::from_str(authority).map_err(|e| format!("invalid TREASURY_ADDRESS: {e}"))?;
    let usdc_mint = Pubkey::from_str(mint).map_err(|e| format!("invalid USDC_MINT: {e}"))?;
    let spender = chain_service::load_spender_keypair(spender_raw)?;
    Ok(Some(ChainContext {
        rpc: Arc::new(rpc),
        program_id,
        authority,
        usdc_mint,
        spender: Arc::new(spender),
        confirm_timeout: Duration::from_secs(config.chain_confirm_timeout_seconds.max(1) as u64),
    }))
}

fn build_r2_store(config: &AppConfig) -> Result<Option<Arc<AmazonS3>>, String> {
    let (Some(endpoint), Some(bucket), Some(key_id), Some(secret)) = (
        config.r2_endpoint.as_ref(),
        config.r2_bucket.as_ref(),
        config.r2_access_key_id.as_ref(),
        config.r2_secret_access_key.as_ref(),
    ) else {
        return Ok(None);
    };
    let store = r2_service::build_store(endpoint, bucket, key_id, secret)?;
    Ok(Some(Arc::new(store)))
}
