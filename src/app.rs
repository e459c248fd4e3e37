use crate::config::environment::AppConfig;
use crate::infra::InfraClients;
use crate::module::job::crud::JobStore;
use crate::module::{auth, credit, job};
use axum::http::{HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<JobStore>,
    pub infra: InfraClients,
}

impl AppState {
    pub fn new(config: AppConfig, infra: InfraClients) -> Self {
        Self {
            config,
            store: Arc::new(JobStore::default()),
            infra,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "skipping unparsable CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    job::route::register_routes(state.clone())
        .merge(auth::route::register_routes(state.clone()))
        .merge(credit::route::register_routes(state))
        .layer(cors)
}
