pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::analysis::handlers;
use crate::analysis::upload::MAX_UPLOAD_BYTES;
use crate::state::AppState;

/// Headroom above the file cap for the job description and multipart framing.
/// Oversized files are rejected by the field reader with a size-specific message.
const MAX_REQUEST_BYTES: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/analyze", post(handlers::handle_analyze))
        .route("/test-api", get(handlers::handle_test_api))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(state)
}

/// Any origin, GET/POST only.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
