use serde::{Deserialize, Serialize};

/// Single-use login challenge, keyed by nonce in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthNonceRecord {
    pub wallet: String,
    pub challenge: String,
    pub expires_at: i64,
}
