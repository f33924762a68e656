use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Liveness only; does not touch the model service.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-analyzer-api"
    }))
}
