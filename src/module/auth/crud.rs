use super::model::AuthNonceRecord;
use super::schema::{ChallengeRequest, ChallengeResponse, VerifyRequest, VerifyResponse};
use crate::app::AppState;
use crate::module::error::AppError;
use crate::module::job::crud::{self, NONCE_TTL_SECONDS, TOKEN_TTL_SECONDS};
use crate::service::{token_service, wallet_auth_service};
use axum::http::HeaderMap;
use chrono::{SecondsFormat, Utc};

pub async fn challenge(
    state: &AppState,
    req: ChallengeRequest,
) -> Result<ChallengeResponse, AppError> {
    let wallet = req.wallet_address.trim().to_string();
    wallet_auth_service::parse_wallet_address(&wallet)
        .map_err(|e| AppError::bad_request("INVALID_WALLET", e))?;

    let nonce = token_service::generate_secret_hex();
    let now = Utc::now();
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let challenge = wallet_auth_service::build_auth_challenge(&wallet, &nonce, &timestamp);
    let record = AuthNonceRecord {
        wallet: wallet.clone(),
        challenge: challenge.clone(),
        expires_at: now.timestamp() + NONCE_TTL_SECONDS as i64,
    };
    crud::put_auth_nonce(state, &nonce, &record).await?;

    Ok(ChallengeResponse {
        wallet_address: wallet,
        challenge,
        nonce,
        expires_in: NONCE_TTL_SECONDS,
    })
}

pub async fn verify(state: &AppState, req: VerifyRequest) -> Result<VerifyResponse, AppError> {
    let wallet = req.wallet_address.trim();
    let record = crud::get_auth_nonce(state, &req.nonce)
        .await?
        .ok_or_else(|| AppError::bad_request("INVALID_NONCE", "unknown or used nonce"))?;
    if record.expires_at <= Utc::now().timestamp() {
        crud::delete_auth_nonce(state, &req.nonce).await?;
        return Err(AppError::bad_request("NONCE_EXPIRED", "nonce expired"));
    }
    if record.wallet != wallet {
        return Err(AppError::bad_request(
            "NONCE_WALLET_MISMATCH",
            "nonce is bound to another wallet",
        ));
    }
    wallet_auth_service::verify_wallet_signature(&record.challenge, &req.signature, &record.wallet)
        .map_err(|e| AppError::unauthorized("INVALID_SIGNATURE", e))?;

    // Single use: only one concurrent verify can take the nonce.
    if crud::consume_auth_nonce(state, &req.nonce).await?.is_none() {
        return Err(AppError::bad_request("INVALID_NONCE", "unknown or used nonce"));
    }

    let token = token_service::generate_secret_hex();
    crud::put_auth_token(state, &token, &record.wallet).await?;
    Ok(VerifyResponse {
        auth_token: token,
        expires_in: TOKEN_TTL_SECONDS,
    })
}

/// Resolves `x-auth-token` to its bound wallet address.
pub async fn resolve_wallet(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !token_service::is_valid_secret_hex(token) {
        return Err(AppError::unauthorized(
            "INVALID_AUTH_TOKEN",
            "missing or invalid auth token",
        ));
    }
    crud::get_auth_token_wallet(state, token)
        .await?
        .ok_or_else(|| {
            AppError::unauthorized("INVALID_AUTH_TOKEN", "missing or invalid auth token")
        })
}
