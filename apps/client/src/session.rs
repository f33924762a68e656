//! Per-session analyzer state: the selected resume, its preview, the job
//! description and where the current analysis stands.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::SessionError;
use crate::model::{AnalysisResult, ParseOutcome};
use crate::parser::parse_analysis;
use crate::preview::{PreviewHandle, PreviewStore};
use crate::transport::{AnalyzeTransport, ResumeFile};

pub const MSG_MISSING_INPUT: &str = "Please upload a resume and enter a job description";
const MSG_INTERRUPTED: &str = "The analysis was interrupted before it finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Uploading,
    Processing,
    Analyzing,
    Complete,
    Error,
}

impl AnalysisStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Uploading | AnalysisStatus::Processing | AnalysisStatus::Analyzing
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStatus::Idle => "idle",
            AnalysisStatus::Uploading => "uploading",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Complete => "complete",
            AnalysisStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Submit,
    RequestSent,
    ResponseReceived,
    Succeeded,
    Failed,
    Reset,
    FileChanged,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot apply {event:?} while {from}")]
pub struct InvalidTransition {
    pub from: AnalysisStatus,
    pub event: SessionEvent,
}

/// The analysis state machine. `Failed` is accepted from every state.
pub fn transition(
    from: AnalysisStatus,
    event: SessionEvent,
) -> Result<AnalysisStatus, InvalidTransition> {
    use AnalysisStatus::*;
    use SessionEvent::*;

    let to = match (from, event) {
        (_, Failed) => Error,
        (Idle | Complete | Error, Submit) => Uploading,
        (Uploading, RequestSent) => Processing,
        (Processing, ResponseReceived) => Analyzing,
        (Analyzing, Succeeded) => Complete,
        (Idle | Complete | Error, Reset | FileChanged) => Idle,
        _ => return Err(InvalidTransition { from, event }),
    };
    Ok(to)
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub file: Option<ResumeFile>,
    preview: Option<PreviewHandle>,
    pub job_description: String,
    pub status: AnalysisStatus,
    pub analysis_result: Option<AnalysisResult>,
    /// Raw model text of the last response, kept even when it could not be parsed.
    pub raw_response: Option<String>,
    pub error: Option<String>,
}

impl SessionState {
    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(PreviewHandle::url)
    }

    fn clear_outcome(&mut self) {
        self.analysis_result = None;
        self.raw_response = None;
        self.error = None;
    }
}

pub type StatusListener = Arc<dyn Fn(AnalysisStatus) + Send + Sync>;

pub struct AnalyzerSession {
    state: SessionState,
    transport: Arc<dyn AnalyzeTransport>,
    previews: Arc<dyn PreviewStore>,
    listener: Option<StatusListener>,
}

impl AnalyzerSession {
    pub fn new(transport: Arc<dyn AnalyzeTransport>, previews: Arc<dyn PreviewStore>) -> Self {
        Self {
            state: SessionState::default(),
            transport,
            previews,
            listener: None,
        }
    }

    /// Calls `listener` with every new status.
    pub fn with_listener(mut self, listener: StatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn apply(&mut self, event: SessionEvent) {
        match transition(self.state.status, event) {
            Ok(next) => {
                self.state.status = next;
                if let Some(listener) = &self.listener {
                    listener(next);
                }
            }
            Err(e) => warn!("Ignoring session event: {}", e),
        }
    }

    fn fail(&mut self, message: String) {
        warn!("Analysis failed: {}", message);
        self.state.error = Some(message);
        self.apply(SessionEvent::Failed);
    }

    fn ensure_not_in_flight(&self) -> Result<(), SessionError> {
        if self.state.status.is_in_flight() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    /// Replaces the selected resume. The old preview is released before the
    /// new one is acquired, so if acquiring fails the session is left with no
    /// file selected and the error is returned.
    pub fn select_file(&mut self, file: ResumeFile) -> Result<(), SessionError> {
        self.ensure_not_in_flight()?;
        self.state.preview = None;
        self.state.file = None;

        let preview = PreviewHandle::acquire(self.previews.clone(), &file)?;
        info!("Selected resume {} ({} bytes)", file.name, file.bytes.len());
        self.state.preview = Some(preview);
        self.state.file = Some(file);
        self.state.clear_outcome();
        self.apply(SessionEvent::FileChanged);
        Ok(())
    }

    pub fn clear_file(&mut self) -> Result<(), SessionError> {
        self.ensure_not_in_flight()?;
        self.state.preview = None;
        self.state.file = None;
        self.state.clear_outcome();
        self.apply(SessionEvent::FileChanged);
        Ok(())
    }

    pub fn set_job_description(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_not_in_flight()?;
        self.state.job_description = text.into();
        Ok(())
    }

    /// Back to idle. The selected file and job description are kept.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_not_in_flight()?;
        self.state.clear_outcome();
        self.apply(SessionEvent::Reset);
        Ok(())
    }

    /// Runs one analysis. Failures land in [`SessionState::error`]; the only
    /// `Err` is [`SessionError::Busy`].
    pub async fn analyze(&mut self) -> Result<(), SessionError> {
        self.ensure_not_in_flight()?;

        let job_description = self.state.job_description.trim().to_string();
        let selected = self.state.file.clone().filter(|_| !job_description.is_empty());
        let Some(file) = selected else {
            self.state.clear_outcome();
            self.fail(MSG_MISSING_INPUT.to_string());
            return Ok(());
        };

        self.state.clear_outcome();
        self.apply(SessionEvent::Submit);
        let mut flight = InFlight {
            session: self,
            finished: false,
        };
        flight.run(file, job_description).await;
        Ok(())
    }
}

/// Moves the session to `error` if an analysis is abandoned mid-flight.
struct InFlight<'a> {
    session: &'a mut AnalyzerSession,
    finished: bool,
}

impl InFlight<'_> {
    async fn run(&mut self, file: ResumeFile, job_description: String) {
        let transport = self.session.transport.clone();
        self.session.apply(SessionEvent::RequestSent);

        let text = match transport.submit(&file, &job_description).await {
            Ok(text) => text,
            Err(e) => {
                self.finished = true;
                self.session.fail(e.user_message());
                return;
            }
        };

        self.session.apply(SessionEvent::ResponseReceived);
        self.finished = true;
        match parse_analysis(&text) {
            ParseOutcome::Parsed(result) => {
                info!("Analysis complete, overall score {}", result.score.overall);
                self.session.state.analysis_result = Some(result);
                self.session.state.raw_response = Some(text);
                self.session.apply(SessionEvent::Succeeded);
            }
            ParseOutcome::Unparsed { raw_text, reason } => {
                self.session.state.raw_response = Some(raw_text);
                self.session
                    .fail(format!("The analysis could not be read: {reason}"));
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished && self.session.state.status.is_in_flight() {
            self.session.fail(MSG_INTERRUPTED.to_string());
        }
    }
}
