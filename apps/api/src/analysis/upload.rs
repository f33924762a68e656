//! Multipart intake and scoped staging of the uploaded resume.

use std::io::Write;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::BytesMut;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::AppError;

/// Largest accepted resume, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const PDF_MIME: &str = "application/pdf";
const RESUME_FIELD: &str = "resume";
const JOB_DESCRIPTION_FIELD: &str = "jobDescription";
/// The PDF header may be preceded by junk; readers scan the first KiB.
const PDF_HEADER_WINDOW: usize = 1024;

pub const MSG_NO_FILE: &str = "No resume file uploaded";
pub const MSG_NOT_PDF: &str = "Only PDF files are allowed";
pub const MSG_TOO_LARGE: &str = "File size exceeds 5MB limit";
pub const MSG_NO_JOB_DESCRIPTION: &str = "Job description is required";

/// A validated analysis request.
#[derive(Debug)]
pub struct ResumeUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub job_description: String,
}

/// Reads and validates the multipart body. Unknown fields are skipped.
pub async fn read_upload(mut multipart: Multipart) -> Result<ResumeUpload, AppError> {
    let mut resume: Option<(String, Vec<u8>)> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some(RESUME_FIELD) => {
                let file_name = field.file_name().unwrap_or("resume.pdf").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !is_pdf_mime(&content_type) {
                    debug!("Rejected upload with content type '{content_type}'");
                    return Err(AppError::Validation(MSG_NOT_PDF.to_string()));
                }
                let bytes = read_limited(field).await?;
                if !has_pdf_header(&bytes) {
                    return Err(AppError::Validation(MSG_NOT_PDF.to_string()));
                }
                resume = Some((file_name, bytes));
            }
            Some(JOB_DESCRIPTION_FIELD) => {
                job_description = Some(field.text().await.map_err(multipart_error)?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let (file_name, bytes) = resume.ok_or_else(|| AppError::Validation(MSG_NO_FILE.into()))?;
    let job_description = job_description
        .filter(|jd| !jd.trim().is_empty())
        .ok_or_else(|| AppError::Validation(MSG_NO_JOB_DESCRIPTION.into()))?;

    Ok(ResumeUpload {
        file_name,
        bytes,
        job_description,
    })
}

/// Streams a field into memory, failing as soon as it exceeds the size cap.
async fn read_limited(mut field: Field<'_>) -> Result<Vec<u8>, AppError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation(MSG_TOO_LARGE.to_string()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.to_vec())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation(MSG_TOO_LARGE.to_string())
    } else {
        AppError::Validation(format!("Invalid multipart request: {}", e.body_text()))
    }
}

fn is_pdf_mime(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(PDF_MIME))
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

// ────────────────────────────────────────────────────────────────────────────
// Staging
// ────────────────────────────────────────────────────────────────────────────

/// A single-use copy of the upload on disk. The file is removed by
/// [`StagedUpload::remove`] or, failing that, when the value is dropped.
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    /// Writes `bytes` to `<millis>-<random>-<name>` inside `dir`.
    pub fn persist(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self, AppError> {
        let prefix = format!("{}-", chrono::Utc::now().timestamp_millis());
        let suffix = format!("-{}", sanitize_file_name(original_name));
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(dir)
            .map_err(|e| anyhow::anyhow!("failed to stage upload in {}: {e}", dir.display()))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| anyhow::anyhow!("failed to write staged upload: {e}"))?;
        debug!("Staged upload at {}", file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Deletes the staged file now. Removal failures are logged, not returned:
    /// the response has already been decided by the time this runs.
    pub fn remove(self) {
        let path: PathBuf = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staged upload {}: {e}", path.display());
            }
        }
    }
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("resume.pdf");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.trim_matches(|c| c == '.' || c == '_').is_empty() {
        "resume.pdf".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_mime_accepts_parameters_and_case() {
        assert!(is_pdf_mime("application/pdf"));
        assert!(is_pdf_mime("Application/PDF; name=cv.pdf"));
        assert!(!is_pdf_mime("text/plain"));
        assert!(!is_pdf_mime(""));
    }

    #[test]
    fn test_pdf_header_detection() {
        assert!(has_pdf_header(b"%PDF-1.7\n..."));
        assert!(has_pdf_header(b"\xef\xbb\xbf\n%PDF-1.4"));
        assert!(!has_pdf_header(b"Plain text resume renamed to .pdf"));
        assert!(!has_pdf_header(b""));
    }

    #[test]
    fn test_sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("My CV (final).pdf"), "My_CV__final_.pdf");
        assert_eq!(sanitize_file_name(""), "resume.pdf");
        assert_eq!(sanitize_file_name("..."), "resume.pdf");
    }

    #[test]
    fn test_staged_files_are_distinct_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagedUpload::persist(dir.path(), "cv.pdf", b"%PDF-1.4 a").unwrap();
        let b = StagedUpload::persist(dir.path(), "cv.pdf", b"%PDF-1.4 b").unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), b"%PDF-1.4 a");

        let name = a.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.ends_with("-cv.pdf"), "unexpected name {name}");
        assert!(name.split('-').next().unwrap().parse::<i64>().is_ok());

        let (pa, pb) = (a.path().to_path_buf(), b.path().to_path_buf());
        a.remove();
        drop(b);
        assert!(!pa.exists());
        assert!(!pb.exists());
    }

    #[test]
    fn test_remove_tolerates_vanished_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::persist(dir.path(), "cv.pdf", b"%PDF-1.4").unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        staged.remove();
    }
}
