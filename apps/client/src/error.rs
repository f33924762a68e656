use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not reach the analysis server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("the analysis request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{error}: {details}")]
    Server {
        status: u16,
        error: String,
        details: String,
    },

    #[error("the server returned an empty analysis")]
    EmptyResult,

    #[error("the server response could not be read: {0}")]
    InvalidResponse(String),

    #[error("could not read the resume file: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Message suitable for showing to the person using the analyzer.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Server { error, .. } => error.clone(),
            ClientError::Timeout { .. } => {
                "The analysis took too long. Please try again.".to_string()
            }
            ClientError::Transport(_) => {
                "Could not reach the analysis server. Please check your connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("could not create a preview: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("an analysis is already in progress")]
    Busy,

    #[error(transparent)]
    Preview(#[from] PreviewError),
}
