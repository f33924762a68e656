//! Local previews of the selected resume. A preview is a scarce handle: it is
//! acquired once per selected file and released when replaced, cleared or dropped.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::PreviewError;
use crate::transport::ResumeFile;

pub trait PreviewStore: Send + Sync {
    /// Makes `file` viewable and returns a URL for it.
    fn acquire(&self, file: &ResumeFile) -> Result<String, PreviewError>;

    /// Frees a URL returned by [`PreviewStore::acquire`].
    fn release(&self, url: &str);
}

/// Owns one preview URL and releases it on drop.
pub struct PreviewHandle {
    url: String,
    store: Arc<dyn PreviewStore>,
}

impl PreviewHandle {
    pub fn acquire(store: Arc<dyn PreviewStore>, file: &ResumeFile) -> Result<Self, PreviewError> {
        let url = store.acquire(file)?;
        debug!("Preview acquired: {}", url);
        Ok(Self { url, store })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        debug!("Preview released: {}", self.url);
        self.store.release(&self.url);
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle").field("url", &self.url).finish()
    }
}

/// Writes previews into a private temp directory as `file://` URLs.
/// The directory and anything left in it go away with the store.
pub struct TempDirPreviewStore {
    dir: TempDir,
}

impl TempDirPreviewStore {
    pub fn new() -> Result<Self, PreviewError> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("resume-preview-").tempdir()?,
        })
    }

    fn path_for(url: &str) -> Option<PathBuf> {
        url.strip_prefix("file://").map(PathBuf::from)
    }
}

impl PreviewStore for TempDirPreviewStore {
    fn acquire(&self, file: &ResumeFile) -> Result<String, PreviewError> {
        let suffix = if file.content_type == "application/pdf" {
            ".pdf"
        } else {
            ""
        };
        let staged = tempfile::Builder::new()
            .prefix("preview-")
            .suffix(suffix)
            .tempfile_in(self.dir.path())?;
        std::fs::write(staged.path(), &file.bytes)?;
        let (_, path) = staged.keep().map_err(|e| PreviewError::Io(e.error))?;
        Ok(format!("file://{}", path.display()))
    }

    fn release(&self, url: &str) {
        let Some(path) = Self::path_for(url) else {
            warn!("Ignoring release of foreign preview url {}", url);
            return;
        };
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove preview {}: {}", path.display(), e);
            }
        }
    }
}
