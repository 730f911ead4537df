pub mod auth;
pub mod cursor;
pub mod rest;
pub mod state;

pub use state::AppState;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/clusters", get(rest::clusters::get_clusters))
        .route("/platforms", get(rest::platforms::get_platforms))
        .route("/ingest", get(rest::ingest::get_ingest_runs).post(rest::ingest::post_ingest))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
