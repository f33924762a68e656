//! Turns uploaded PDF bytes into plain text on the blocking pool.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("malformed PDF: {0}")]
    Malformed(String),

    #[error("PDF contains no extractable text")]
    NoText,

    #[error("PDF extraction aborted: {0}")]
    Aborted(String),
}

/// Synchronous extraction backend. Runs on the blocking pool via [`extract_text`].
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Production extractor backed by `pdf-extract`.
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(ExtractionError::NoText);
        }
        Ok(text)
    }
}

/// Runs the extractor off the async workers. A panic inside the PDF library
/// surfaces as `ExtractionError::Aborted` instead of killing the request task.
pub async fn extract_text(
    extractor: Arc<dyn TextExtractor>,
    bytes: Vec<u8>,
) -> Result<String, ExtractionError> {
    let size = bytes.len();
    let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
        .await
        .map_err(|e| ExtractionError::Aborted(e.to_string()))??;
    debug!("Extracted {} chars of text from {} byte PDF", text.len(), size);
    Ok(text)
}
