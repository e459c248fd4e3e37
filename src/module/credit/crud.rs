use super::schema::{
    BalanceResponse, TopupConfirmRequest, TopupConfirmResponse, TopupIntentRequest,
    TopupIntentResponse,
};
use crate::app::AppState;
use crate::module::error::AppError;
use crate::module::job::crud;
use crate::service::chain_service::{self, ChainContext, ChainError};
use crate::service::credit_program_service::{self, CREDIT_UNIT};
use crate::service::wallet_auth_service;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

fn require_chain(state: &AppState) -> Result<ChainContext, AppError> {
    state.infra.chain.clone().ok_or_else(|| {
        AppError::bad_gateway("CHAIN_UNAVAILABLE", "chain client is not configured")
    })
}

fn wallet_key(wallet: &str) -> Result<Pubkey, AppError> {
    // The wallet came out of the auth-token store; a parse failure here is
    // corrupted state, not client input.
    wallet_auth_service::parse_wallet_address(wallet)
        .map_err(|e| AppError::internal("WALLET_DECODE_FAILED", e))
}

pub async fn balance(state: &AppState, wallet: &str) -> Result<BalanceResponse, AppError> {
    let chain = require_chain(state)?;
    let credits = chain_service::read_credit_balance(&chain, &wallet_key(wallet)?)
        .await
        .map_err(chain_err)?;
    Ok(BalanceResponse { credits })
}

pub async fn topup_intent(
    state: &AppState,
    wallet: &str,
    req: TopupIntentRequest,
) -> Result<TopupIntentResponse, AppError> {
    if req.credits_to_buy == 0 {
        return Err(AppError::bad_request(
            "INVALID_CREDITS_AMOUNT",
            "credits_to_buy must be positive",
        ));
    }
    let amount_base_units = req.credits_to_buy.checked_mul(CREDIT_UNIT).ok_or_else(|| {
        AppError::bad_request("INVALID_CREDITS_AMOUNT", "credits_to_buy is too large")
    })?;

    let chain = require_chain(state)?;
    let user = wallet_key(wallet)?;
    let config_pda = credit_program_service::config_pda(&chain.program_id, &chain.authority);
    let user_credit_pda = credit_program_service::user_credit_pda(&chain.program_id, &user);
    let vault_usdc =
        credit_program_service::associated_token_address(&config_pda, &chain.usdc_mint);
    let user_usdc = credit_program_service::associated_token_address(&user, &chain.usdc_mint);
    let data = credit_program_service::pay_usdc_instruction_data(amount_base_units);

    Ok(TopupIntentResponse {
        program_id: chain.program_id.to_string(),
        config_pda: config_pda.to_string(),
        user_credit_pda: user_credit_pda.to_string(),
        vault_usdc: vault_usdc.to_string(),
        user_usdc: user_usdc.to_string(),
        usdc_mint: chain.usdc_mint.to_string(),
        instruction_data: BASE64.encode(data),
        amount_base_units,
        credit_unit: CREDIT_UNIT,
        credits_to_buy: req.credits_to_buy,
    })
}

/// Marks a pay_usdc receipt as observed, at most once. Crediting itself
/// happened on chain; this only prevents replayed confirmations and answers
/// with the fresh balance.
pub async fn topup_confirm(
    state: &AppState,
    wallet: &str,
    req: TopupConfirmRequest,
) -> Result<TopupConfirmResponse, AppError> {
    let signature = req.signature.trim();
    if signature.is_empty() {
        return Err(AppError::bad_request(
            "INVALID_SIGNATURE",
            "transaction signature is required",
        ));
    }
    let chain = require_chain(state)?;
    let user = wallet_key(wallet)?;

    if crud::is_topup_signature_marked(state, signature).await? {
        let credits = chain_service::read_credit_balance(&chain, &user)
            .await
            .map_err(chain_err)?;
        return Ok(TopupConfirmResponse {
            credited: true,
            new_balance: credits,
        });
    }

    let invoked = chain_service::transaction_invokes_program(&chain, signature)
        .await
        .map_err(|e| match e {
            ChainError::TransactionFailed(reason) => {
                AppError::bad_request("TRANSACTION_FAILED", reason)
            }
            ChainError::Decode(reason) => AppError::bad_request("INVALID_SIGNATURE", reason),
            other => AppError::bad_gateway("CHAIN_READ_FAILED", other.to_string()),
        })?;
    if !invoked {
        return Err(AppError::bad_request(
            "WRONG_PROGRAM",
            "transaction does not invoke the credits program",
        ));
    }

    // A concurrent confirm may have marked it first; either way the receipt
    // is now recorded and the answer is the same.
    let fresh = crud::try_mark_topup_signature(state, signature).await?;
    if fresh {
        info!(wallet, signature, "topup receipt recorded");
    }
    let credits = chain_service::read_credit_balance(&chain, &user)
        .await
        .map_err(chain_err)?;
    Ok(TopupConfirmResponse {
        credited: true,
        new_balance: credits,
    })
}

fn chain_err(e: ChainError) -> AppError {
    AppError::bad_gateway("CHAIN_READ_FAILED", e.to_string())
}
