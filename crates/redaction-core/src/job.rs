//! Detection job status as reported by the redaction service

use serde::{Deserialize, Serialize};

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// No further status changes will follow
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    /// Progress in percent
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub cancellable: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn new(status: JobState, progress: f64) -> Self {
        Self {
            status,
            progress,
            current_step: None,
            cancellable: false,
            error: None,
        }
    }
}
