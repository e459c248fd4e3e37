use super::controller;
use crate::app::AppState;
use axum::routing::post;
use axum::Router;

pub fn register_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/challenge", post(controller::challenge))
        .route("/api/auth/verify", post(controller::verify))
        .with_state(state)
}
