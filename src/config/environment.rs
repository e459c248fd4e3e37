use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rust_env: String,
    pub api_host: String,
    pub api_port: u16,
    pub cors_origins: Vec<String>,
    pub redis_url: Option<String>,
    pub nosana_api_base: String,
    pub nosana_api_key: String,
    pub nosana_worker_image: String,
    pub nosana_market: String,
    pub nosana_gpu_model: String,
    pub r2_endpoint: Option<String>,
    pub r2_bucket: Option<String>,
    pub r2_access_key_id: Option<String>,
    pub r2_secret_access_key: Option<String>,
    pub callback_base_url: String,
    pub callback_token: String,
    pub llm_api_base: String,
    pub llm_model_name: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_seconds: i64,
    pub solana_rpc_url: Option<String>,
    pub usdc_mint: Option<String>,
    pub treasury_address: Option<String>,
    pub credits_program_id: Option<String>,
    pub spender_keypair: Option<String>,
    pub chain_confirm_timeout_seconds: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        load_dotenv_layers();
        Ok(Self {
            rust_env: read_optional_string("RUST_ENV", "development"),
            api_host: read_optional_string("API_HOST", "0.0.0.0"),
            api_port: read_optional_u16("API_PORT", 8000)?,
            cors_origins: read_cors_origins(),
            redis_url: env::var("REDIS_URL").ok(),
            nosana_api_base: read_optional_string(
                "NOSANA_API_BASE",
                "https://dashboard.k8s.prd.nos.ci/api",
            ),
            nosana_api_key: read_var("NOSANA_API_KEY")?,
            nosana_worker_image: read_var("NOSANA_WORKER_IMAGE")?,
            nosana_market: read_var("NOSANA_MARKET")?,
            nosana_gpu_model: read_optional_string("NOSANA_GPU_MODEL", "3080"),
            r2_endpoint: env::var("R2_ENDPOINT").ok(),
            r2_bucket: env::var("R2_BUCKET").ok(),
            r2_access_key_id: env::var("R2_ACCESS_KEY_ID").ok(),
            r2_secret_access_key: env::var("R2_SECRET_ACCESS_KEY").ok(),
            callback_base_url: read_var("CALLBACK_BASE_URL")?,
            callback_token: read_var("CALLBACK_TOKEN")?,
            llm_api_base: read_var("LLM_API_BASE")?,
            llm_model_name: read_var("LLM_MODEL_NAME")?,
            llm_api_key: env::var("LLM_API_KEY").ok(),
            llm_timeout_seconds: read_optional_i64("LLM_TIMEOUT_SECONDS", 120)?,
            solana_rpc_url: env::var("SOLANA_RPC_URL").ok(),
            usdc_mint: env::var("USDC_MINT").ok(),
            treasury_address: env::var("TREASURY_ADDRESS").ok(),
            credits_program_id: env::var("CREDITS_PROGRAM_ID").ok(),
            spender_keypair: env::var("SPENDER_KEYPAIR").ok(),
            chain_confirm_timeout_seconds: read_optional_i64("CHAIN_CONFIRM_TIMEOUT_SECONDS", 30)?,
        })
    }

    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/callback/nosana",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

fn read_var(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("missing required env var: {key}"))
}

fn read_optional_i64(key: &str, default: i64) -> Result<i64, String> {
    match env::var(key) {
        Ok(v) => v.parse::<i64>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_u16(key: &str, default: u16) -> Result<u16, String> {
    match env::var(key) {
        Ok(v) => v.parse::<u16>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_cors_origins() -> Vec<String> {
    match env::var("CORS_ORIGINS") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        Err(_) => vec![
            "http://localhost:3000".to_string(),
            "http://127.0.0.1:3000".to_string(),
        ],
    }
}

fn load_dotenv_layers() {
    for path in [".env", "../.env"] {
        let _ = dotenvy::from_path_override(path);
    }
}
