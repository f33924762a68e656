//! Gemini client. Every model call in the service goes through here.
//!
//! Handlers only see the `TextGenerator` trait; `LlmClient` is the production backend.
//! The model name is fixed at compile time.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for all LLM calls.
pub const MODEL: &str = "gemini-1.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.2;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Model service rejected credentials (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Prompt blocked by model service: {0}")]
    Blocked(String),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Gave up after {retries} retries")]
    RetriesExhausted { retries: u32 },
}

impl LlmError {
    /// The external service could not be reached or did not answer in time.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LlmError::Transport(_) | LlmError::Timeout { .. } | LlmError::RetriesExhausted { .. }
        )
    }

    /// The service answered but produced nothing usable.
    pub fn is_empty_result(&self) -> bool {
        matches!(
            self,
            LlmError::EmptyContent | LlmError::Malformed(_) | LlmError::Blocked(_)
        )
    }

    /// Worth another attempt: network failures, rate limiting and 5xx.
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Anything that can turn a prompt into free text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types (Gemini generateContent)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenates the text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The single LLM client. Wraps Gemini `generateContent` with bounded,
/// jittered retries for transient failures.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    endpoint: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl LlmClient {
    pub fn new(api_key: String, max_retries: u32) -> Result<Self, LlmError> {
        let endpoint = format!("{GEMINI_API_BASE}/{MODEL}:generateContent");
        Self::with_endpoint(api_key, endpoint, max_retries)
    }

    pub fn with_endpoint(
        api_key: String,
        endpoint: String,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            endpoint,
            max_retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Makes one request to Gemini and returns the non-empty response text.
    async fn call_once(&self, prompt: &str) -> Result<String, LlmError> {
        let request_body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth {
                    status: status.as_u16(),
                    message,
                },
                code => LlmError::Api {
                    status: code,
                    message,
                },
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Malformed(e.to_string()))?;

        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Err(LlmError::Blocked(reason));
        }

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "LLM call succeeded: prompt_tokens={}, output_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        match parsed.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => {
                let finish_reason = parsed
                    .candidates
                    .first()
                    .and_then(|c| c.finish_reason.as_deref())
                    .unwrap_or("none");
                warn!("LLM returned no text (finish reason: {finish_reason})");
                Err(LlmError::EmptyContent)
            }
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    /// Retries transient failures with exponential backoff plus jitter.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_with_jitter(self.retry_backoff, attempt);
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.call_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    warn!("Transient LLM failure: {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LlmError::RetriesExhausted {
            retries: self.max_retries,
        }))
    }
}

/// `base * 2^(attempt-1)` plus up to half of that again as random jitter.
fn backoff_with_jitter(base: Duration, attempt: u32) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let spread = exp / 2 + 1;
    let jitter = (Uuid::new_v4().as_u128() % spread as u128) as u64;
    Duration::from_millis(exp.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    #[test]
    fn test_response_text_joins_parts() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Score: 72"}, {"text": "\nGood fit"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("Score: 72\nGood fit"));
    }

    #[test]
    fn test_response_without_candidates_has_no_text() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(parsed.text().is_none());
        assert_eq!(
            parsed.prompt_feedback.unwrap().block_reason.as_deref(),
            Some("SAFETY")
        );
    }

    #[test]
    fn test_backoff_stays_within_bounds() {
        let base = Duration::from_millis(500);
        for _ in 0..50 {
            let first = backoff_with_jitter(base, 1).as_millis();
            assert!((500..=750).contains(&first), "first retry was {first}ms");
            let second = backoff_with_jitter(base, 2).as_millis();
            assert!((1000..=1500).contains(&second), "second retry was {second}ms");
        }
    }

    #[test]
    fn test_backoff_saturates_on_huge_base() {
        let base = Duration::from_millis(u64::MAX / 2);
        let delay = backoff_with_jitter(base, 8);
        assert_eq!(delay, Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Api { status: 429, message: String::new() }.is_transient());
        assert!(LlmError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!LlmError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!LlmError::Auth { status: 401, message: String::new() }.is_transient());
        assert!(!LlmError::EmptyContent.is_transient());
    }

    // ── Fake Gemini endpoint ────────────────────────────────────────────────

    #[derive(Clone)]
    struct FakeGemini {
        calls: Arc<AtomicU32>,
        /// Status codes to return before answering successfully.
        failures: Arc<Vec<u16>>,
        answer: &'static str,
    }

    async fn fake_generate(State(fake): State<FakeGemini>) -> (StatusCode, Json<Value>) {
        let n = fake.calls.fetch_add(1, Ordering::SeqCst) as usize;
        if let Some(code) = fake.failures.get(n) {
            return (
                StatusCode::from_u16(*code).unwrap(),
                Json(json!({"error": {"code": code, "message": "simulated failure"}})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"candidates": [{"content": {"parts": [{"text": fake.answer}]}}]})),
        )
    }

    async fn spawn_fake(failures: Vec<u16>, answer: &'static str) -> (String, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let fake = FakeGemini {
            calls: calls.clone(),
            failures: Arc::new(failures),
            answer,
        };
        let app = Router::new()
            .route("/generate", post(fake_generate))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/generate"), calls)
    }

    fn client(endpoint: String, retries: u32) -> LlmClient {
        LlmClient::with_endpoint("test-key".into(), endpoint, retries)
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_generate_retries_transient_failures() {
        let (endpoint, calls) = spawn_fake(vec![503, 429], "OVERALL SCORE: 80").await;
        let text = client(endpoint, 2).generate("prompt").await.unwrap();
        assert_eq!(text, "OVERALL SCORE: 80");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_max_retries() {
        let (endpoint, calls) = spawn_fake(vec![503, 503, 503], "unused").await;
        let err = client(endpoint, 1).generate("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let (endpoint, calls) = spawn_fake(vec![403], "unused").await;
        let err = client(endpoint, 3).generate("prompt").await.unwrap_err();
        match err {
            LlmError::Auth { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "simulated failure");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_answer_is_empty_content() {
        let (endpoint, _) = spawn_fake(vec![], "   \n").await;
        let err = client(endpoint, 0).generate("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
        assert!(err.is_empty_result());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}/generate"), 0)
            .generate("prompt")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
