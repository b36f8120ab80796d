//! Review session for one document
//!
//! `Workbench` owns the review state of a single document and talks to the
//! redaction service. Local state lives behind one async mutex that is only
//! held for synchronous updates, never across a service call:
//!
//! 1. lock, validate and apply the change optimistically, unlock
//! 2. await the service
//! 3. lock again, then confirm or roll back
//!
//! Two calls racing on the same match are resolved by whichever response
//! is processed last.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use redaction_core::coords::display_drag_to_document;
use redaction_core::geometry::validate;
use redaction_core::matches::check_threshold;
use redaction_core::overlay::{project_manual, project_matches};
use redaction_core::{
    parse_ranges, Approval, ApprovalAction, ApprovalCommand, ErrorLog, FinalizationGate,
    FinalizeReceipt, JobId, JobState, JobStatus, LoadSummary, ManualId, ManualOverlay,
    ManualRedaction, ManualRedactionStore, MatchOverlay, MatchStats, MatchStore, PageFrame,
    PageGeometry, PlanOptions, Point, ProcessingStatus, Rect, RedactionError, RedactionMatch,
    RedactionPlan, SyncError, SyncErrorCode, Workflow, WorkflowState,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WorkbenchConfig;
use crate::debounce::Debouncer;
use crate::error::{Result, ServiceError, WorkbenchError};
use crate::poller::{JobPoller, JobWatch};
use crate::service::RedactionService;

struct ReviewState {
    matches: MatchStore,
    manual: ManualRedactionStore,
    gate: FinalizationGate,
    workflow: Workflow,
    errors: ErrorLog,
    frames: HashMap<u32, PageFrame>,
}

impl ReviewState {
    fn clear(&mut self) {
        self.matches.clear();
        self.manual.remove_all();
        self.gate.reset();
        self.workflow.reset();
        self.errors.clear();
    }

    /// Record a failed service call and build the error returned to the caller
    fn sync_failed(&mut self, code: SyncErrorCode, source: ServiceError) -> WorkbenchError {
        self.errors.push(code, source.to_string());
        WorkbenchError::Sync { code, source }
    }
}

/// Overlays of one page in display space
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOverlays {
    pub matches: Vec<MatchOverlay>,
    pub manual: Vec<ManualOverlay>,
}

/// Summary for the review sidebar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStats {
    pub threshold: f64,
    pub matches: MatchStats,
    pub manual: usize,
    pub can_finalize: bool,
    pub processing: ProcessingStatus,
    pub workflow: WorkflowState,
}

pub struct Workbench {
    document_id: String,
    service: Arc<dyn RedactionService>,
    state: Arc<Mutex<ReviewState>>,
    poller: JobPoller,
    detection: Mutex<Option<JobWatch>>,
    /// Set while a detection request is on its way to the service
    starting_detection: AtomicBool,
    threshold_input: Debouncer,
    plan_options: PlanOptions,
}

/// Clears the pending-start flag when the request settles or the call is
/// dropped mid-flight
struct StartGuard<'a>(&'a AtomicBool);

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Workbench {
    /// Open a review session for `document_id`
    pub fn create(
        document_id: impl Into<String>,
        config: &WorkbenchConfig,
        service: Arc<dyn RedactionService>,
    ) -> Result<Self> {
        let document_id = document_id.into();
        let state = ReviewState {
            matches: MatchStore::new(config.review.threshold)?,
            manual: ManualRedactionStore::new(),
            gate: FinalizationGate::new(),
            workflow: Workflow::new(),
            errors: ErrorLog::new(),
            frames: HashMap::new(),
        };
        info!(document_id = %document_id, threshold = config.review.threshold, "Workbench opened");

        Ok(Self {
            poller: JobPoller::new(Arc::clone(&service), &config.polling),
            document_id,
            service,
            state: Arc::new(Mutex::new(state)),
            detection: Mutex::new(None),
            starting_detection: AtomicBool::new(false),
            threshold_input: Debouncer::new(config.review.debounce()),
            plan_options: config.review.plan_options(),
        })
    }

    /// Stop every background task and drop the review state
    pub async fn dispose(self) {
        self.poller.cancel_all();
        self.threshold_input.cancel();
        self.detection.lock().await.take();
        self.state.lock().await.clear();
        info!(document_id = %self.document_id, "Workbench disposed");
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    // ------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------

    /// Record page bounds and a default frame (scale 1, page `/Rotate`)
    pub async fn register_pages(&self, pages: &[PageGeometry]) -> Result<()> {
        let mut frames = Vec::with_capacity(pages.len());
        for page in pages {
            frames.push((page.page_num, page.frame(1.0, 0.0)?));
        }

        let mut state = self.state.lock().await;
        for page in pages {
            state
                .manual
                .set_page_size(page.page_num, page.width, page.height);
        }
        state.frames.extend(frames);
        debug!(count = pages.len(), "Registered pages");
        Ok(())
    }

    /// Update the presentation frame of a page after zoom or rotation
    pub async fn set_frame(&self, page: u32, frame: PageFrame) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.manual.page_size(page).is_none() {
            return Err(RedactionError::UnknownPage(page).into());
        }
        state.frames.insert(page, frame);
        Ok(())
    }

    pub async fn frame(&self, page: u32) -> Option<PageFrame> {
        self.state.lock().await.frames.get(&page).copied()
    }

    // ------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------

    /// Start a detection job, optionally restricted to a page range such as
    /// `"1-3, 7"`, and begin polling it.
    ///
    /// Only one start request is in flight at a time. If the workflow moved
    /// on while the service was creating the job (e.g. finalization began),
    /// the new job is cancelled again.
    pub async fn start_detection(&self, pages: Option<&str>) -> Result<JobId> {
        let (selection, _guard) = {
            let state = self.state.lock().await;
            if !state.workflow.can_start_detection() {
                return Err(RedactionError::InvalidTransition(format!(
                    "cannot start detection while {}",
                    state.workflow.state().name()
                ))
                .into());
            }
            let page_count = match state.manual.page_count() {
                0 => None,
                n => u32::try_from(n).ok(),
            };
            let selection = pages
                .map(|input| parse_ranges(input, page_count))
                .transpose()?;
            if self.starting_detection.swap(true, Ordering::AcqRel) {
                return Err(RedactionError::InvalidTransition(
                    "a detection job is already being started".to_string(),
                )
                .into());
            }
            (selection, StartGuard(&self.starting_detection))
        };

        let result = self
            .service
            .start_detection(&self.document_id, selection.as_deref())
            .await;
        let job_id = match result {
            Ok(job_id) => job_id,
            Err(e) => {
                let mut state = self.state.lock().await;
                return Err(state.sync_failed(SyncErrorCode::DetectionError, e));
            }
        };

        let started = self
            .state
            .lock()
            .await
            .workflow
            .start_detection(job_id.clone());
        if let Err(e) = started {
            warn!(job_id = %job_id, error = %e, "Workflow moved on, cancelling new detection job");
            if let Err(cancel_err) = self.service.cancel_job(&job_id).await {
                self.state
                    .lock()
                    .await
                    .errors
                    .push(SyncErrorCode::CancelJobError, cancel_err.to_string());
            }
            return Err(e.into());
        }

        let watch = self.poller.watch(job_id.clone());
        if let Some(previous) = self.detection.lock().await.replace(watch) {
            if previous.job_id() != job_id {
                self.poller.cancel(previous.job_id());
            }
        }
        Ok(job_id)
    }

    /// Latest status of the running detection job
    pub async fn detection_status(&self) -> Option<JobStatus> {
        self.detection
            .lock()
            .await
            .as_ref()
            .and_then(JobWatch::latest)
    }

    /// Wait for the running detection job to finish and load its matches
    pub async fn wait_for_detection(&self) -> Result<LoadSummary> {
        let mut watch = self
            .detection
            .lock()
            .await
            .clone()
            .ok_or(WorkbenchError::NoDetection)?;
        let job_id = watch.job_id().to_string();
        let status = watch.wait().await;

        if status.status != JobState::Completed {
            let mut state = self.state.lock().await;
            if state.workflow.detection_job() == Some(&job_id) {
                state.workflow.detection_stopped()?;
                if status.status == JobState::Failed {
                    let message = status
                        .error
                        .clone()
                        .unwrap_or_else(|| "detection failed".to_string());
                    state.errors.push(SyncErrorCode::DetectionError, message);
                }
            }
            drop(state);
            self.clear_detection(&job_id).await;
            return Err(WorkbenchError::JobEnded {
                job_id,
                state: status.status,
                message: status.error,
            });
        }

        let result = self.service.list_matches(&self.document_id, &job_id).await;
        let mut state = self.state.lock().await;
        if state.workflow.detection_job() != Some(&job_id) {
            // Cancelled or superseded while the matches were in flight
            return Err(WorkbenchError::JobEnded {
                job_id,
                state: JobState::Cancelled,
                message: Some("detection is no longer current".to_string()),
            });
        }
        let summary = match result {
            Ok(matches) => {
                let summary = state.matches.load(matches);
                state.workflow.detection_completed()?;
                summary
            }
            Err(e) => {
                state.workflow.detection_stopped()?;
                return Err(state.sync_failed(SyncErrorCode::LoadMatchesError, e));
            }
        };
        drop(state);
        self.clear_detection(&job_id).await;
        info!(job_id = %job_id, loaded = summary.loaded, auto_approved = summary.auto_approved, "Detection results loaded");
        Ok(summary)
    }

    /// Load the matches of an already-finished job
    pub async fn load_matches(&self, job_id: &str) -> Result<LoadSummary> {
        let result = self.service.list_matches(&self.document_id, job_id).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(matches) => {
                state.workflow.enter_review()?;
                Ok(state.matches.load(matches))
            }
            Err(e) => Err(state.sync_failed(SyncErrorCode::LoadMatchesError, e)),
        }
    }

    /// Cancel the running detection job if the service allows it
    pub async fn cancel_detection(&self) -> Result<()> {
        let cancellable = self
            .detection_status()
            .await
            .is_some_and(|status| status.cancellable);
        let job_id = {
            let state = self.state.lock().await;
            let job_id = state
                .workflow
                .detection_job()
                .cloned()
                .ok_or(WorkbenchError::NoDetection)?;
            if !state.workflow.can_cancel(cancellable) {
                return Err(RedactionError::InvalidTransition(format!(
                    "job {} cannot be cancelled",
                    job_id
                ))
                .into());
            }
            job_id
        };

        if let Err(e) = self.service.cancel_job(&job_id).await {
            let mut state = self.state.lock().await;
            return Err(state.sync_failed(SyncErrorCode::CancelJobError, e));
        }

        self.poller.cancel(&job_id);
        {
            let mut state = self.state.lock().await;
            if state.workflow.detection_job() == Some(&job_id) {
                state.workflow.cancel(true)?;
            }
        }
        self.clear_detection(&job_id).await;
        info!(job_id = %job_id, "Detection cancelled");
        Ok(())
    }

    async fn clear_detection(&self, job_id: &str) {
        let mut detection = self.detection.lock().await;
        if detection.as_ref().is_some_and(|w| w.job_id() == job_id) {
            detection.take();
        }
    }

    // ------------------------------------------------------------------
    // Approvals
    // ------------------------------------------------------------------

    pub async fn approve(&self, id: &str) -> Result<()> {
        self.resolve_one(id, Approval::Approved).await
    }

    pub async fn reject(&self, id: &str) -> Result<()> {
        self.resolve_one(id, Approval::Rejected).await
    }

    /// Approve every `Pending` match; returns how many were affected
    pub async fn approve_all(&self) -> Result<usize> {
        self.resolve_bulk(ApprovalAction::ApproveAll).await
    }

    /// Reject every `Pending` match; returns how many were affected
    pub async fn reject_all(&self) -> Result<usize> {
        self.resolve_bulk(ApprovalAction::RejectAll).await
    }

    /// Approve `Pending` matches at or above `threshold_pct`, or the
    /// current threshold when none is given
    pub async fn approve_high_confidence(&self, threshold_pct: Option<f64>) -> Result<usize> {
        let threshold_pct = match threshold_pct {
            Some(pct) => pct,
            None => self.state.lock().await.matches.threshold(),
        };
        self.resolve_bulk(ApprovalAction::ApproveHighConfidence { threshold_pct })
            .await
    }

    async fn resolve_one(&self, id: &str, target: Approval) -> Result<()> {
        let command = {
            let mut state = self.state.lock().await;
            let mut command = ApprovalCommand::single(&state.matches, id, target)?;
            command.apply(&mut state.matches)?;
            command
        };
        self.sync(command).await.map(|_| ())
    }

    async fn resolve_bulk(&self, action: ApprovalAction) -> Result<usize> {
        let command = {
            let mut state = self.state.lock().await;
            let mut command = ApprovalCommand::bulk(&state.matches, action)?;
            command.apply(&mut state.matches)?;
            command
        };
        self.sync(command).await
    }

    /// Send an applied command and settle it on the response
    async fn sync(&self, mut command: ApprovalCommand) -> Result<usize> {
        let count = command.ids().len();
        if command.is_empty() {
            command.confirm();
            return Ok(0);
        }

        let result = self
            .service
            .set_approval(&self.document_id, command.ids(), command.target())
            .await;

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                command.confirm();
                debug!(action = ?command.action(), count, "Approval synced");
                Ok(count)
            }
            Err(e) => {
                command.rollback(&mut state.matches);
                Err(state.sync_failed(command.action().error_code(), e))
            }
        }
    }

    // ------------------------------------------------------------------
    // Threshold
    // ------------------------------------------------------------------

    pub async fn threshold(&self) -> f64 {
        self.state.lock().await.matches.threshold()
    }

    /// Apply a threshold immediately
    pub async fn set_threshold(&self, threshold_pct: f64) -> Result<()> {
        self.state
            .lock()
            .await
            .matches
            .set_threshold(threshold_pct)?;
        Ok(())
    }

    /// Apply a threshold from live input once it settles. Out-of-range
    /// values are rejected right away and never scheduled.
    pub fn set_threshold_debounced(&self, threshold_pct: f64) -> Result<()> {
        check_threshold(threshold_pct)?;
        let state = Arc::clone(&self.state);
        self.threshold_input.schedule(async move {
            if let Err(e) = state.lock().await.matches.set_threshold(threshold_pct) {
                warn!(error = %e, "Debounced threshold rejected");
            }
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Manual redactions
    // ------------------------------------------------------------------

    /// Add a document-space rectangle to a page
    pub async fn add_manual(
        &self,
        page: u32,
        rect: Rect,
        reason: Option<String>,
    ) -> Result<ManualId> {
        let mut state = self.state.lock().await;
        Self::add_manual_locked(&mut state, page, rect, reason)
    }

    /// Add the rectangle spanned by a pointer drag in display space
    pub async fn add_manual_from_drag(
        &self,
        page: u32,
        start: Point,
        end: Point,
        reason: Option<String>,
    ) -> Result<ManualId> {
        let mut state = self.state.lock().await;
        let frame = state
            .frames
            .get(&page)
            .copied()
            .ok_or(WorkbenchError::NoFrame(page))?;
        let rect = display_drag_to_document(start, end, &frame);
        Self::add_manual_locked(&mut state, page, rect, reason)
    }

    fn add_manual_locked(
        state: &mut ReviewState,
        page: u32,
        rect: Rect,
        reason: Option<String>,
    ) -> Result<ManualId> {
        let (width, height) = state
            .manual
            .page_size(page)
            .ok_or(RedactionError::UnknownPage(page))?;
        if !validate(&rect, width, height) {
            return Err(RedactionError::OutOfBounds { page }.into());
        }
        let id = state
            .manual
            .add(page, rect, reason)
            .ok_or(RedactionError::OutOfBounds { page })?;
        if *state.workflow.state() == WorkflowState::Idle {
            state.workflow.enter_review()?;
        }
        Ok(id)
    }

    pub async fn remove_manual(&self, id: ManualId) -> bool {
        self.state.lock().await.manual.remove(id)
    }

    pub async fn clear_manual(&self) {
        self.state.lock().await.manual.remove_all();
    }

    /// Remove the most recently added manual redaction
    pub async fn undo_manual(&self) -> Option<ManualRedaction> {
        self.state.lock().await.manual.undo_last()
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    pub async fn can_finalize(&self) -> bool {
        let state = self.state.lock().await;
        state.gate.can_finalize(&state.matches, &state.manual)
    }

    /// Submit the approved set for permanent redaction.
    ///
    /// The request is frozen when the call starts; changes made while it is
    /// in flight are not part of it. On failure the stores are untouched and
    /// the call can be retried.
    pub async fn finalize(&self) -> Result<FinalizeReceipt> {
        let request = {
            let mut state = self.state.lock().await;
            let ReviewState {
                matches,
                manual,
                gate,
                workflow,
                ..
            } = &mut *state;
            let request = gate.begin(&self.document_id, matches, manual)?;
            if let Err(e) = workflow.begin_finalizing() {
                gate.abort();
                return Err(e.into());
            }
            request
        };

        let result = self.service.finalize(&request).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(receipt) => {
                state.gate.complete(receipt.clone());
                state
                    .workflow
                    .finalize_succeeded(receipt.download_url.clone())?;
                Ok(receipt)
            }
            Err(e) => {
                let ReviewState {
                    gate,
                    workflow,
                    errors,
                    ..
                } = &mut *state;
                gate.fail(errors, e.to_string());
                workflow.finalize_failed(e.to_string())?;
                Err(WorkbenchError::Sync {
                    code: SyncErrorCode::FinalizeError,
                    source: e,
                })
            }
        }
    }

    pub async fn download_url(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .gate
            .download_url()
            .map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub async fn matches(&self) -> Vec<RedactionMatch> {
        self.state.lock().await.matches.matches().to_vec()
    }

    pub async fn manual_redactions(&self) -> Vec<ManualRedaction> {
        self.state.lock().await.manual.redactions().to_vec()
    }

    /// Match and manual overlays of a page, in its current display space
    pub async fn overlays(&self, page: u32) -> Result<PageOverlays> {
        let state = self.state.lock().await;
        let frame = state
            .frames
            .get(&page)
            .ok_or(WorkbenchError::NoFrame(page))?;
        Ok(PageOverlays {
            matches: project_matches(&state.matches, page, frame),
            manual: project_manual(&state.manual, page, frame),
        })
    }

    pub async fn stats(&self) -> ReviewStats {
        let state = self.state.lock().await;
        ReviewStats {
            threshold: state.matches.threshold(),
            matches: state.matches.stats(),
            manual: state.manual.len(),
            can_finalize: state.gate.can_finalize(&state.matches, &state.manual),
            processing: state.gate.status(),
            workflow: state.workflow.state().clone(),
        }
    }

    pub async fn workflow_state(&self) -> WorkflowState {
        self.state.lock().await.workflow.state().clone()
    }

    /// Merged per-page preview of what finalization will cover
    pub async fn plan(&self) -> RedactionPlan {
        let state = self.state.lock().await;
        RedactionPlan::build(&state.matches, &state.manual, &self.plan_options)
    }

    pub async fn errors(&self) -> Vec<SyncError> {
        self.state.lock().await.errors.entries().to_vec()
    }

    pub async fn clear_errors(&self) {
        self.state.lock().await.errors.clear();
    }
}
