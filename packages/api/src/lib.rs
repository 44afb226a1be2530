use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use state::AppState;

/// Full HTTP surface, shared by the Lambda handler, local mode and tests.
pub fn app(state: AppState) -> Router {
    // ToDo: restrict origins once the dashboard domains are fixed
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::car::routes())
        .merge(routes::station::routes())
        .layer(cors)
        .with_state(state)
}
