//! HTTP side of the analyzer: ships the resume and job description to
//! `POST /analyze` and hands back the raw model text.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROMPT_TYPE: &str = "match";
const PDF_MIME: &str = "application/pdf";

/// A resume picked by the user, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ResumeFile {
    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: PDF_MIME.to_string(),
            bytes,
        }
    }

    /// Reads a file from disk. The content type is taken from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume.pdf".to_string());
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        let content_type = if is_pdf {
            PDF_MIME
        } else {
            "application/octet-stream"
        };
        Ok(Self {
            name,
            content_type: content_type.to_string(),
            bytes,
        })
    }
}

#[async_trait]
pub trait AnalyzeTransport: Send + Sync {
    /// Submits one analysis and returns the server's raw result text.
    async fn submit(&self, file: &ResumeFile, job_description: &str)
        -> Result<String, ClientError>;
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    result: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    details: String,
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Same as [`HttpTransport::new`] with a custom limit for the whole exchange.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ClientError::Transport(e)
        }
    }

    fn form(file: &ResumeFile, job_description: &str) -> Result<Form, ClientError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)?;
        Ok(Form::new()
            .part("resume", part)
            .text("jobDescription", job_description.to_string())
            .text("promptType", PROMPT_TYPE))
    }
}

#[async_trait]
impl AnalyzeTransport for HttpTransport {
    async fn submit(
        &self,
        file: &ResumeFile,
        job_description: &str,
    ) -> Result<String, ClientError> {
        let url = format!("{}/analyze", self.base_url);
        info!("Submitting {} ({} bytes) to {}", file.name, file.bytes.len(), url);

        let response = self
            .client
            .post(&url)
            .multipart(Self::form(file, job_description)?)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.request_error(e))?;
        debug!("Analyze response status {}, {} bytes", status, body.len());

        if !status.is_success() {
            let (error, details) = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => (parsed.error, parsed.details),
                Err(_) => (format!("Request failed with status {}", status.as_u16()), body),
            };
            warn!("Analysis failed: {} ({})", error, details);
            return Err(ClientError::Server {
                status: status.as_u16(),
                error,
                details,
            });
        }

        let parsed: AnalyzeResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        match parsed.result {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ClientError::EmptyResult),
        }
    }
}
