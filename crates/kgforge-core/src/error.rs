use thiserror::Error;

use crate::job::JobState;

#[derive(Error, Debug)]
pub enum KgError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Graph database error: {0}")]
    Graph(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Status store error: {0}")]
    Status(String),

    #[error("Job already running: {0}")]
    Busy(String),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KgError {
    /// Whether this error ends the job it occurs in.
    ///
    /// Extraction-call failures are absorbed per batch; every other error that
    /// reaches the orchestrator moves the job to `Error`.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KgError::Extraction(_) | KgError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, KgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_errors_are_absorbed() {
        assert!(!KgError::Extraction("timeout".into()).is_fatal());
        assert!(KgError::Graph("connection reset".into()).is_fatal());
        assert!(KgError::Input("missing file".into()).is_fatal());
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = KgError::InvalidTransition {
            from: JobState::Completed,
            to: JobState::Uploaded,
        };
        assert_eq!(err.to_string(), "Invalid job transition: Completed -> Uploaded");
    }
}
