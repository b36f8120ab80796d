//! Document-level review workflow
//!
//! ```text
//! Idle -> Detecting -> Reviewing -> Finalizing -> Completed
//!            |  ^                       |
//!            v  |                       v
//!          (cancel)                   Failed -> Reviewing (retry)
//! ```
//!
//! Cancellation is only possible while a service job is running
//! (`Detecting` or `Finalizing`) and that job says it can be cancelled.

use serde::Serialize;
use tracing::info;

use crate::error::RedactionError;
use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Detecting { job_id: JobId },
    Reviewing,
    Finalizing,
    Completed { download_url: String },
    Failed { message: String },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Detecting { .. } => "detecting",
            WorkflowState::Reviewing => "reviewing",
            WorkflowState::Finalizing => "finalizing",
            WorkflowState::Completed { .. } => "completed",
            WorkflowState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    state: WorkflowState,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            state: WorkflowState::Idle,
        }
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Job id of the running detection, if any
    pub fn detection_job(&self) -> Option<&JobId> {
        match &self.state {
            WorkflowState::Detecting { job_id } => Some(job_id),
            _ => None,
        }
    }

    /// A new detection run may start from idle or over a finished review;
    /// it never interrupts finalization.
    pub fn can_start_detection(&self) -> bool {
        matches!(
            self.state,
            WorkflowState::Idle | WorkflowState::Reviewing | WorkflowState::Failed { .. }
        )
    }

    pub fn start_detection(&mut self, job_id: JobId) -> Result<(), RedactionError> {
        if !self.can_start_detection() {
            return Err(self.invalid("start detection"));
        }
        self.transition(WorkflowState::Detecting { job_id });
        Ok(())
    }

    pub fn detection_completed(&mut self) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Detecting { .. } => {
                self.transition(WorkflowState::Reviewing);
                Ok(())
            }
            _ => Err(self.invalid("complete detection")),
        }
    }

    /// Detection failed or was cancelled; nothing to review
    pub fn detection_stopped(&mut self) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Detecting { .. } => {
                self.transition(WorkflowState::Idle);
                Ok(())
            }
            _ => Err(self.invalid("stop detection")),
        }
    }

    /// Review without a detection run in between: matches supplied from an
    /// already-finished job, or manual rectangles drawn from idle
    pub fn enter_review(&mut self) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Idle | WorkflowState::Detecting { .. } | WorkflowState::Reviewing => {
                self.transition(WorkflowState::Reviewing);
                Ok(())
            }
            _ => Err(self.invalid("load matches")),
        }
    }

    pub fn begin_finalizing(&mut self) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Reviewing | WorkflowState::Failed { .. } => {
                self.transition(WorkflowState::Finalizing);
                Ok(())
            }
            WorkflowState::Finalizing => Err(RedactionError::FinalizeInProgress),
            _ => Err(self.invalid("finalize")),
        }
    }

    pub fn finalize_succeeded(&mut self, download_url: String) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Finalizing => {
                self.transition(WorkflowState::Completed { download_url });
                Ok(())
            }
            _ => Err(self.invalid("complete finalization")),
        }
    }

    pub fn finalize_failed(&mut self, message: String) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Finalizing => {
                self.transition(WorkflowState::Failed { message });
                Ok(())
            }
            _ => Err(self.invalid("fail finalization")),
        }
    }

    /// Back to review after a failed finalization
    pub fn retry(&mut self) -> Result<(), RedactionError> {
        match self.state {
            WorkflowState::Failed { .. } => {
                self.transition(WorkflowState::Reviewing);
                Ok(())
            }
            _ => Err(self.invalid("retry")),
        }
    }

    pub fn can_cancel(&self, job_cancellable: bool) -> bool {
        job_cancellable
            && matches!(
                self.state,
                WorkflowState::Detecting { .. } | WorkflowState::Finalizing
            )
    }

    /// Cancel the running job: detection goes back to idle, finalization
    /// back to review.
    pub fn cancel(&mut self, job_cancellable: bool) -> Result<(), RedactionError> {
        if !self.can_cancel(job_cancellable) {
            return Err(self.invalid("cancel"));
        }
        let next = match self.state {
            WorkflowState::Detecting { .. } => WorkflowState::Idle,
            _ => WorkflowState::Reviewing,
        };
        self.transition(next);
        Ok(())
    }

    /// Close the document
    pub fn reset(&mut self) {
        self.transition(WorkflowState::Idle);
    }

    fn transition(&mut self, next: WorkflowState) {
        info!(from = self.state.name(), to = next.name(), "Workflow transition");
        self.state = next;
    }

    fn invalid(&self, action: &str) -> RedactionError {
        RedactionError::InvalidTransition(format!(
            "cannot {} while {}",
            action,
            self.state.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut wf = Workflow::new();
        wf.start_detection("job-1".to_string()).unwrap();
        assert_eq!(wf.detection_job(), Some(&"job-1".to_string()));
        wf.detection_completed().unwrap();
        assert_eq!(wf.state(), &WorkflowState::Reviewing);
        wf.begin_finalizing().unwrap();
        wf.finalize_succeeded("https://files/doc.pdf".to_string())
            .unwrap();
        assert_eq!(wf.state().name(), "completed");
    }

    #[test]
    fn test_failed_finalization_is_retryable() {
        let mut wf = Workflow::new();
        wf.enter_review().unwrap();
        wf.begin_finalizing().unwrap();
        assert_eq!(wf.begin_finalizing(), Err(RedactionError::FinalizeInProgress));
        wf.finalize_failed("boom".to_string()).unwrap();
        wf.retry().unwrap();
        assert_eq!(wf.state(), &WorkflowState::Reviewing);
    }

    #[test]
    fn test_cancel_rules() {
        let mut wf = Workflow::new();
        assert!(!wf.can_cancel(true));

        wf.start_detection("job-1".to_string()).unwrap();
        assert!(!wf.can_cancel(false));
        assert!(wf.cancel(false).is_err());
        wf.cancel(true).unwrap();
        assert_eq!(wf.state(), &WorkflowState::Idle);

        wf.enter_review().unwrap();
        assert!(wf.cancel(true).is_err());
        wf.begin_finalizing().unwrap();
        wf.cancel(true).unwrap();
        assert_eq!(wf.state(), &WorkflowState::Reviewing);
    }

    #[test]
    fn test_cannot_detect_while_finalizing() {
        let mut wf = Workflow::new();
        wf.enter_review().unwrap();
        wf.begin_finalizing().unwrap();
        assert!(!wf.can_start_detection());
        assert!(wf.start_detection("job-2".to_string()).is_err());
    }

    #[test]
    fn test_completed_is_final() {
        let mut wf = Workflow::new();
        wf.enter_review().unwrap();
        wf.begin_finalizing().unwrap();
        wf.finalize_succeeded("url".to_string()).unwrap();
        assert!(wf.begin_finalizing().is_err());
        assert!(wf.retry().is_err());
        wf.reset();
        assert_eq!(wf.state(), &WorkflowState::Idle);
    }
}
