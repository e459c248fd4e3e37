use super::controller;
use crate::app::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn register_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", post(controller::create_job))
        .route("/api/jobs/:job_id", get(controller::get_job))
        .route("/api/jobs/:job_id/results", get(controller::get_results))
        .route(
            "/api/jobs/:job_id/clips/:clip_file/preview",
            get(controller::preview_clip),
        )
        .route(
            "/api/jobs/:job_id/clips/:clip_file/download",
            get(controller::download_clip),
        )
        .route(
            "/api/jobs/:job_id/clips/:clip_file/stream",
            get(controller::stream_clip),
        )
        .route(
            "/api/jobs/:job_id/clips/:clip_file/unlock",
            post(controller::unlock_clip),
        )
        .route("/api/callback/nosana", post(controller::nosana_callback))
        .route("/api/health", get(controller::health))
        .with_state(state)
}
