//! Finalization gate
//!
//! Finalizing submits the approved matches and manual rectangles for
//! permanent application. It is allowed once something is marked for
//! redaction and no `Pending` match below the threshold is left, and it
//! cannot be started twice concurrently.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ErrorLog, RedactionError, SyncErrorCode};
use crate::manual::{ManualRedaction, ManualRedactionStore};
use crate::matches::{MatchId, MatchStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Frozen set submitted to the finalize endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub document_id: String,
    pub approved_match_ids: Vec<MatchId>,
    pub manual_redactions: Vec<ManualRedaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeReceipt {
    pub download_url: String,
}

/// Whether the commit action should be enabled
pub fn can_finalize(
    matches: &MatchStore,
    manual: &ManualRedactionStore,
    status: ProcessingStatus,
) -> bool {
    (matches.approved_count() > 0 || !manual.is_empty())
        && matches.pending_below_threshold_count() == 0
        && status != ProcessingStatus::Processing
}

#[derive(Debug, Clone, Default)]
pub struct FinalizationGate {
    status: ProcessingStatus,
    /// Status before the running attempt began, restored by `abort`
    before: ProcessingStatus,
    download_url: Option<String>,
}

impl FinalizationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    pub fn can_finalize(&self, matches: &MatchStore, manual: &ManualRedactionStore) -> bool {
        can_finalize(matches, manual, self.status)
    }

    /// Freeze the current approved set and move to `Processing`.
    ///
    /// The returned request is what must be sent; the stores may keep
    /// changing afterwards without affecting it.
    pub fn begin(
        &mut self,
        document_id: &str,
        matches: &MatchStore,
        manual: &ManualRedactionStore,
    ) -> Result<FinalizeRequest, RedactionError> {
        match self.status {
            ProcessingStatus::Processing => return Err(RedactionError::FinalizeInProgress),
            ProcessingStatus::Completed => {
                return Err(RedactionError::InvalidTransition(
                    "document is already finalized".to_string(),
                ))
            }
            ProcessingStatus::Pending | ProcessingStatus::Failed => {}
        }
        if !can_finalize(matches, manual, self.status) {
            let blocking = matches.pending_below_threshold_count();
            let reason = if blocking > 0 {
                format!("{} match(es) below the threshold still need review", blocking)
            } else {
                "no approved matches or manual redactions".to_string()
            };
            return Err(RedactionError::NotReady(reason));
        }

        let request = FinalizeRequest {
            document_id: document_id.to_string(),
            approved_match_ids: matches.approved_ids(),
            manual_redactions: manual.redactions().to_vec(),
        };
        info!(
            document_id,
            approved = request.approved_match_ids.len(),
            manual = request.manual_redactions.len(),
            "Finalization started"
        );
        self.before = self.status;
        self.status = ProcessingStatus::Processing;
        Ok(request)
    }

    pub fn complete(&mut self, receipt: FinalizeReceipt) {
        info!(download_url = %receipt.download_url, "Finalization completed");
        self.status = ProcessingStatus::Completed;
        self.download_url = Some(receipt.download_url);
    }

    /// Record the failure; the stores are left as they were so the user
    /// can retry.
    pub fn fail(&mut self, errors: &mut ErrorLog, message: impl Into<String>) {
        self.status = ProcessingStatus::Failed;
        errors.push(SyncErrorCode::FinalizeError, message);
    }

    /// Drop an attempt that never reached the service, or was cancelled,
    /// and go back to the status it started from
    pub fn abort(&mut self) {
        if self.status == ProcessingStatus::Processing {
            self.status = self.before;
        }
    }

    pub fn reset(&mut self) {
        self.status = ProcessingStatus::Pending;
        self.before = ProcessingStatus::Pending;
        self.download_url = None;
    }
}
