use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matches::MatchId;

/// Validation failures, raised before any state changes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedactionError {
    #[error("Invalid page frame: {0}")]
    InvalidFrame(String),

    #[error("Rectangle out of page bounds on page {page}")]
    OutOfBounds { page: u32 },

    #[error("Unknown page: {0}")]
    UnknownPage(u32),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("Threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(f64),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Match {0} is already resolved")]
    AlreadyResolved(MatchId),

    #[error("Finalization is already in progress")]
    FinalizeInProgress,

    #[error("Nothing can be finalized yet: {0}")]
    NotReady(String),

    #[error("Invalid workflow transition: {0}")]
    InvalidTransition(String),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),
}

/// Codes for failures of calls to the redaction service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncErrorCode {
    ApproveMatchError,
    RejectMatchError,
    BulkApproveError,
    BulkRejectError,
    LoadMatchesError,
    DetectionError,
    JobStatusError,
    CancelJobError,
    FinalizeError,
}

impl std::fmt::Display for SyncErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Same spelling as the serialized form
        let code = match self {
            SyncErrorCode::ApproveMatchError => "APPROVE_MATCH_ERROR",
            SyncErrorCode::RejectMatchError => "REJECT_MATCH_ERROR",
            SyncErrorCode::BulkApproveError => "BULK_APPROVE_ERROR",
            SyncErrorCode::BulkRejectError => "BULK_REJECT_ERROR",
            SyncErrorCode::LoadMatchesError => "LOAD_MATCHES_ERROR",
            SyncErrorCode::DetectionError => "DETECTION_ERROR",
            SyncErrorCode::JobStatusError => "JOB_STATUS_ERROR",
            SyncErrorCode::CancelJobError => "CANCEL_JOB_ERROR",
            SyncErrorCode::FinalizeError => "FINALIZE_ERROR",
        };
        f.write_str(code)
    }
}

/// A recoverable failure surfaced to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    pub code: SyncErrorCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SyncError {
    pub fn new(code: SyncErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only list of surfaced errors, cleared on user dismissal
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorLog {
    entries: Vec<SyncError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: SyncErrorCode, message: impl Into<String>) -> &SyncError {
        let entry = SyncError::new(code, message);
        tracing::warn!(code = %entry.code, message = %entry.message, "Sync error");
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[SyncError] {
        &self.entries
    }

    pub fn last(&self) -> Option<&SyncError> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
