pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::flow::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/flows", post(handlers::handle_run_flow))
        .with_state(state)
}
