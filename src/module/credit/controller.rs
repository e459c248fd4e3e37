use super::crud;
use super::schema::{
    BalanceResponse, TopupConfirmRequest, TopupConfirmResponse, TopupIntentRequest,
    TopupIntentResponse,
};
use crate::app::AppState;
use crate::module::auth::crud as auth_crud;
use crate::module::error::AppError;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

pub async fn balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BalanceResponse>, AppError> {
    let wallet = auth_crud::resolve_wallet(&state, &headers).await?;
    Ok(Json(crud::balance(&state, &wallet).await?))
}

pub async fn topup_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TopupIntentRequest>,
) -> Result<Json<TopupIntentResponse>, AppError> {
    let wallet = auth_crud::resolve_wallet(&state, &headers).await?;
    Ok(Json(crud::topup_intent(&state, &wallet, req).await?))
}

pub async fn topup_confirm(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TopupConfirmRequest>,
) -> Result<Json<TopupConfirmResponse>, AppError> {
    let wallet = auth_crud::resolve_wallet(&state, &headers).await?;
    Ok(Json(crud::topup_confirm(&state, &wallet, req).await?))
}
