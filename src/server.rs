use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Discovery
        .route(
            "/projects",
            get(crate::routes::extraction::list_projects),
        )
        .route(
            "/projects/{project}/plans",
            get(crate::routes::extraction::list_plans),
        )
        // Extractions
        .route(
            "/extractions",
            get(crate::routes::extraction::list_extractions)
                .post(crate::routes::extraction::run_extraction),
        )
        .route(
            "/extractions/{id}/cancel",
            post(crate::routes::extraction::cancel_extraction),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
