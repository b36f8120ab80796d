//! Error types for the workbench

use redaction_core::{JobId, JobState, RedactionError, SyncErrorCode};
use thiserror::Error;

/// Failure talking to the redaction service
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout
        } else if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ServiceError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkbenchError {
    /// Rejected locally before any mutation or request
    #[error(transparent)]
    Validation(#[from] RedactionError),

    /// The request failed; local state was rolled back and the failure
    /// recorded in the error log under `code`
    #[error("{code}: {source}")]
    Sync {
        code: SyncErrorCode,
        #[source]
        source: ServiceError,
    },

    #[error("Detection job {job_id} ended as {state:?}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    JobEnded {
        job_id: JobId,
        state: JobState,
        message: Option<String>,
    },

    #[error("No detection job is running")]
    NoDetection,

    #[error("No page frame registered for page {0}")]
    NoFrame(u32),
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;
