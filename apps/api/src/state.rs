use std::sync::Arc;

use crate::analysis::extract::TextExtractor;
use crate::config::Config;
use crate::llm_client::TextGenerator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Model backend. `LlmClient` in production, swapped for fakes in tests.
    pub llm: Arc<dyn TextGenerator>,
    pub extractor: Arc<dyn TextExtractor>,
}
