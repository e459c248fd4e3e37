use super::crud;
use super::schema::{ChallengeRequest, ChallengeResponse, VerifyRequest, VerifyResponse};
use crate::app::AppState;
use crate::module::error::AppError;
use axum::extract::State;
use axum::Json;
use tracing::info;

pub async fn challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, AppError> {
    let resp = crud::challenge(&state, req).await?;
    info!(wallet = %resp.wallet_address, "auth challenge issued");
    Ok(Json(resp))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let wallet = req.wallet_address.clone();
    let resp = crud::verify(&state, req).await?;
    info!(wallet = %wallet, "wallet verified, auth token issued");
    Ok(Json(resp))
}
