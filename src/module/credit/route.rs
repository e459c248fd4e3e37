use super::controller;
use crate::app::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn register_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/credits/balance", get(controller::balance))
        .route(
            "/api/credits/topup/usdc/intent",
            post(controller::topup_intent),
        )
        .route(
            "/api/credits/topup/usdc/confirm",
            post(controller::topup_confirm),
        )
        .with_state(state)
}
