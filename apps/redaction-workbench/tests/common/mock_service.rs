//! In-memory redaction service for workbench tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use redaction_core::{
    Approval, FinalizeReceipt, FinalizeRequest, JobId, JobState, JobStatus, MatchId, Rect,
    RedactionMatch,
};
use redaction_workbench::{RedactionService, ServiceError, WorkbenchConfig};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MockState {
    /// Returned by every `list_matches` call
    pub matches: Vec<RedactionMatch>,
    /// Status responses in order; the last one repeats
    pub statuses: VecDeque<JobStatus>,
    pub fail_approval: bool,
    pub fail_finalize: bool,
    pub fail_list: bool,
    pub fail_cancel: bool,
    pub approval_calls: Vec<(Vec<MatchId>, Approval)>,
    pub finalize_requests: Vec<FinalizeRequest>,
    pub detection_pages: Vec<Option<Vec<u32>>>,
    pub cancelled: Vec<JobId>,
    pub status_calls: usize,
    next_job: u32,
}

#[derive(Default)]
pub struct MockService {
    pub state: Mutex<MockState>,
    /// When set, `set_approval` and `finalize` wait for a permit before
    /// answering
    pub hold: Option<Arc<Notify>>,
    /// When set, `start_detection` records the request and then waits for
    /// a permit before returning the job id
    pub hold_start: Option<Arc<Notify>>,
}

impl MockService {
    pub fn with_matches(matches: Vec<RedactionMatch>) -> Self {
        let service = Self::default();
        service.state.lock().unwrap().matches = matches;
        service
    }

    pub fn held(mut self) -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        self.hold = Some(Arc::clone(&notify));
        (self, notify)
    }

    pub fn held_start(mut self) -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        self.hold_start = Some(Arc::clone(&notify));
        (self, notify)
    }

    pub fn script_statuses(&self, statuses: Vec<JobStatus>) {
        self.state.lock().unwrap().statuses = statuses.into();
    }

    pub fn set<F: FnOnce(&mut MockState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn read<T, F: FnOnce(&MockState) -> T>(&self, f: F) -> T {
        f(&self.state.lock().unwrap())
    }

    async fn wait_for_permit(&self) {
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
    }
}

fn unavailable() -> ServiceError {
    ServiceError::Status {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

#[async_trait]
impl RedactionService for MockService {
    async fn start_detection(
        &self,
        _document_id: &str,
        pages: Option<&[u32]>,
    ) -> Result<JobId, ServiceError> {
        let job_id = {
            let mut state = self.state.lock().unwrap();
            state.next_job += 1;
            state.detection_pages.push(pages.map(<[u32]>::to_vec));
            format!("job-{}", state.next_job)
        };
        if let Some(hold) = &self.hold_start {
            hold.notified().await;
        }
        Ok(job_id)
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatus, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front()
        } else {
            state.statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(|| JobStatus::new(JobState::Completed, 100.0)))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_cancel {
            return Err(unavailable());
        }
        state.cancelled.push(job_id.to_string());
        Ok(())
    }

    async fn list_matches(
        &self,
        _document_id: &str,
        _job_id: &str,
    ) -> Result<Vec<RedactionMatch>, ServiceError> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(unavailable());
        }
        Ok(state.matches.clone())
    }

    async fn set_approval(
        &self,
        _document_id: &str,
        ids: &[MatchId],
        approval: Approval,
    ) -> Result<(), ServiceError> {
        self.wait_for_permit().await;
        let mut state = self.state.lock().unwrap();
        state.approval_calls.push((ids.to_vec(), approval));
        if state.fail_approval {
            Err(unavailable())
        } else {
            Ok(())
        }
    }

    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeReceipt, ServiceError> {
        self.wait_for_permit().await;
        let mut state = self.state.lock().unwrap();
        state.finalize_requests.push(request.clone());
        if state.fail_finalize {
            return Err(unavailable());
        }
        Ok(FinalizeReceipt {
            download_url: format!("https://files.example.com/{}.pdf", request.document_id),
        })
    }
}

pub fn candidate(id: &str, page: u32, confidence: f64) -> RedactionMatch {
    RedactionMatch {
        id: id.to_string(),
        original_text: format!("text {}", id),
        matched_text: format!("text {}", id),
        page,
        rect: Rect::new(100.0, 200.0, 80.0, 20.0),
        confidence,
        approval: Approval::Pending,
    }
}

/// Config with fast polling so paused-time tests stay short
pub fn test_config() -> WorkbenchConfig {
    let mut config = WorkbenchConfig::default();
    config.polling.interval_ms = 100;
    config
}

pub fn running(progress: f64, cancellable: bool) -> JobStatus {
    JobStatus {
        cancellable,
        ..JobStatus::new(JobState::Running, progress)
    }
}
