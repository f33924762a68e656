//! Client side of the resume analyzer: submits a resume and job description
//! to the API, parses the model's answer and tracks per-session state.

pub mod error;
pub mod model;
pub mod parser;
pub mod preview;
pub mod session;
pub mod transport;

pub use error::{ClientError, PreviewError, SessionError};
pub use model::{
    AnalysisResult, ParseOutcome, ResumeScore, ResumeSection, SectionFeedback, UnparsedReason,
};
pub use parser::parse_analysis;
pub use preview::{PreviewHandle, PreviewStore, TempDirPreviewStore};
pub use session::{
    transition, AnalysisStatus, AnalyzerSession, InvalidTransition, SessionEvent, SessionState,
    StatusListener,
};
pub use transport::{AnalyzeTransport, HttpTransport, ResumeFile};
