//! Redaction service interface
//!
//! Everything the workbench needs from the backend. The HTTP client in
//! [`crate::http`] is the production implementation; tests plug in an
//! in-memory one.

use async_trait::async_trait;
use redaction_core::{
    Approval, FinalizeReceipt, FinalizeRequest, JobId, JobStatus, MatchId, RedactionMatch,
};

use crate::error::ServiceError;

#[async_trait]
pub trait RedactionService: Send + Sync {
    /// Start a detection job, optionally restricted to the given pages
    async fn start_detection(
        &self,
        document_id: &str,
        pages: Option<&[u32]>,
    ) -> Result<JobId, ServiceError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ServiceError>;

    async fn cancel_job(&self, job_id: &str) -> Result<(), ServiceError>;

    /// Candidates produced by a finished detection job
    async fn list_matches(
        &self,
        document_id: &str,
        job_id: &str,
    ) -> Result<Vec<RedactionMatch>, ServiceError>;

    /// Persist one approval decision for every id; applied atomically
    async fn set_approval(
        &self,
        document_id: &str,
        ids: &[MatchId],
        approval: Approval,
    ) -> Result<(), ServiceError>;

    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeReceipt, ServiceError>;
}
