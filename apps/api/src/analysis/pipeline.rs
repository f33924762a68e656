//! Upload → stage → extract → prompt → model. One call per request.

use tracing::{info, warn};

use crate::analysis::extract::extract_text;
use crate::analysis::prompts::build_analysis_prompt;
use crate::analysis::upload::{ResumeUpload, StagedUpload};
use crate::errors::AppError;
use crate::llm_client::LlmError;
use crate::state::AppState;

/// Runs the full analysis for one validated upload and returns the raw model text.
///
/// The staged copy is removed before this returns, whatever the outcome.
pub async fn run_analysis(state: &AppState, upload: ResumeUpload) -> Result<String, AppError> {
    let staged = StagedUpload::persist(&state.config.upload_dir, &upload.file_name, &upload.bytes)?;
    drop(upload.bytes);

    let outcome = analyze_staged(state, &staged, &upload.job_description).await;
    staged.remove();
    outcome
}

async fn analyze_staged(
    state: &AppState,
    staged: &StagedUpload,
    job_description: &str,
) -> Result<String, AppError> {
    let bytes = match tokio::fs::read(staged.path()).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Staged upload vanished before processing: {}", staged.path().display());
            return Err(AppError::NotFound("Uploaded file not found".to_string()));
        }
        Err(e) => return Err(anyhow::Error::from(e).context("reading staged upload").into()),
    };

    let resume_text = extract_text(state.extractor.clone(), bytes).await?;
    info!("Resume text extracted, length: {}", resume_text.len());

    let prompt = build_analysis_prompt(&resume_text, job_description);

    let timeout = state.config.analysis_timeout;
    let analysis = tokio::time::timeout(timeout, state.llm.generate(&prompt))
        .await
        .map_err(|_| LlmError::Timeout {
            secs: timeout.as_secs(),
        })??;

    info!("Received analysis from model, length: {}", analysis.len());
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::analysis::extract::{ExtractionError, TextExtractor};
    use crate::config::Config;
    use crate::llm_client::TextGenerator;

    struct EchoExtractor;

    impl TextExtractor for EchoExtractor {
        fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
            Err(ExtractionError::Malformed("bad xref".into()))
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("OVERALL SCORE: 64".to_string())
        }
    }

    struct HangingGenerator;

    #[async_trait]
    impl TextGenerator for HangingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    fn state(
        dir: &std::path::Path,
        llm: Arc<dyn TextGenerator>,
        extractor: Arc<dyn TextExtractor>,
    ) -> AppState {
        AppState {
            config: Config {
                google_api_key: "test".into(),
                port: 0,
                upload_dir: dir.to_path_buf(),
                analysis_timeout: Duration::from_millis(100),
                llm_max_retries: 0,
                llm_retry_backoff: Duration::from_millis(1),
                rust_log: "debug".into(),
            },
            llm,
            extractor,
        }
    }

    fn upload(body: &str) -> ResumeUpload {
        ResumeUpload {
            file_name: "cv.pdf".into(),
            bytes: format!("%PDF-1.4 {body}").into_bytes(),
            job_description: "Rust backend engineer".into(),
        }
    }

    fn dir_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_success_returns_model_text_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingGenerator::default());
        let state = state(dir.path(), llm.clone(), Arc::new(EchoExtractor));

        let text = run_analysis(&state, upload("Jane Doe, Rust")).await.unwrap();

        assert_eq!(text, "OVERALL SCORE: 64");
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Jane Doe, Rust"));
        assert!(prompts[0].contains("Rust backend engineer"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_extraction_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingGenerator::default());
        let state = state(dir.path(), llm.clone(), Arc::new(FailingExtractor));

        let err = run_analysis(&state, upload("x")).await.unwrap_err();

        assert!(matches!(err, AppError::Extraction(_)));
        assert!(llm.prompts.lock().unwrap().is_empty());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_hung_model_call_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Arc::new(HangingGenerator), Arc::new(EchoExtractor));

        let err = run_analysis(&state, upload("x")).await.unwrap_err();

        assert!(matches!(err, AppError::Llm(LlmError::Timeout { .. })));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_vanished_upload_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingGenerator::default());
        let state = state(dir.path(), llm.clone(), Arc::new(EchoExtractor));
        let staged = StagedUpload::persist(dir.path(), "cv.pdf", b"%PDF-1.4").unwrap();
        std::fs::remove_file(staged.path()).unwrap();

        let err = analyze_staged(&state, &staged, "jd").await.unwrap_err();
        staged.remove();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_upload_dir_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let state = state(&missing, Arc::new(RecordingGenerator::default()), Arc::new(EchoExtractor));

        let err = run_analysis(&state, upload("x")).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
