use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub credits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupIntentRequest {
    pub credits_to_buy: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupIntentResponse {
    pub program_id: String,
    pub config_pda: String,
    pub user_credit_pda: String,
    pub vault_usdc: String,
    pub user_usdc: String,
    pub usdc_mint: String,
    pub instruction_data: String,
    pub amount_base_units: u64,
    pub credit_unit: u64,
    pub credits_to_buy: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupConfirmRequest {
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupConfirmResponse {
    pub credited: bool,
    pub new_balance: u64,
}
