//! Axum route handlers for the Analysis API.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::analysis::pipeline::run_analysis;
use crate::analysis::upload::read_upload;
use crate::errors::AppError;
use crate::llm_client::prompts::PROBE_PROMPT;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// Raw model text; structuring it is the client's job.
    pub result: String,
}

/// POST /analyze
///
/// Multipart fields: `resume` (PDF, ≤5MB) and `jobDescription`.
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let multipart = multipart.map_err(|e| {
        AppError::Validation(format!("Expected a multipart/form-data body: {}", e.body_text()))
    })?;
    info!("Received analyze request");

    let upload = read_upload(multipart).await?;
    info!(
        file_name = %upload.file_name,
        size = upload.bytes.len(),
        "Resume upload accepted"
    );

    let result = run_analysis(&state, upload).await?;
    Ok(Json(AnalyzeResponse { result }))
}

/// GET /test-api
///
/// Sends a trivial prompt to the model to confirm credentials and connectivity.
pub async fn handle_test_api(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let timeout = state.config.analysis_timeout;
    let outcome = match tokio::time::timeout(timeout, state.llm.generate(PROBE_PROMPT)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("Model call timed out after {}s", timeout.as_secs())),
    };

    match outcome {
        Ok(text) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": "API is working",
                "result": text,
            })),
        ),
        Err(e) => {
            error!("Model probe failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": "API test failed",
                    "error": e,
                })),
            )
        }
    }
}
