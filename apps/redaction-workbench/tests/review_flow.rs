//! Review workflow tests: approvals, threshold, manual redactions and
//! finalization against an in-memory service.
//!
//! Run with: cargo test -p redaction-workbench --test review_flow

#[path = "common/mock_service.rs"]
mod mock_service;

use std::sync::Arc;
use std::time::Duration;

use mock_service::{candidate, test_config, MockService};
use pretty_assertions::assert_eq;
use redaction_core::page::PageOrientation;
use redaction_core::{
    Approval, JobState, JobStatus, PageGeometry, Point, ProcessingStatus, Rect, RedactionError,
    SyncErrorCode, WorkflowState,
};
use redaction_workbench::{Workbench, WorkbenchError};

fn letter_page(page_num: u32) -> PageGeometry {
    PageGeometry {
        page_num,
        width: 612.0,
        height: 792.0,
        rotation: 0,
        orientation: PageOrientation::Portrait,
    }
}

fn reviewed_matches() -> Vec<redaction_core::RedactionMatch> {
    vec![
        candidate("a", 1, 0.95),
        candidate("b", 1, 0.92),
        candidate("c", 2, 0.60),
    ]
}

async fn loaded(service: Arc<MockService>) -> Workbench {
    let workbench = Workbench::create("doc-1", &test_config(), service).unwrap();
    workbench.load_matches("job-0").await.unwrap();
    workbench
}

async fn approval_of(workbench: &Workbench, id: &str) -> Approval {
    workbench
        .matches()
        .await
        .into_iter()
        .find(|m| m.id == id)
        .map(|m| m.approval)
        .unwrap()
}

#[tokio::test]
async fn test_load_auto_approves_at_threshold() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    let workbench = loaded(service).await;

    let stats = workbench.stats().await;
    assert_eq!(stats.matches.total, 3);
    assert_eq!(stats.matches.approved, 2);
    assert_eq!(stats.matches.pending_below_threshold, 1);
    assert!(!stats.can_finalize);
    assert_eq!(stats.workflow, WorkflowState::Reviewing);
}

#[tokio::test]
async fn test_approve_is_applied_before_the_service_answers() {
    let (mock, gate) = MockService::with_matches(reviewed_matches()).held();
    let service = Arc::new(mock);
    let workbench = Arc::new(loaded(service.clone()).await);

    let task = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.approve("c").await })
    };

    let mut applied = false;
    for _ in 0..100 {
        if approval_of(&workbench, "c").await == Approval::Approved {
            applied = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(applied, "approval should be visible while the request is in flight");
    assert!(workbench.can_finalize().await);

    gate.notify_one();
    task.await.unwrap().unwrap();
    assert_eq!(approval_of(&workbench, "c").await, Approval::Approved);
    assert_eq!(
        service.read(|s| s.approval_calls.clone()),
        vec![(vec!["c".to_string()], Approval::Approved)]
    );
}

#[tokio::test]
async fn test_failed_approve_rolls_back_and_logs() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    service.set(|s| s.fail_approval = true);
    let workbench = loaded(service).await;

    let err = workbench.approve("c").await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Sync {
            code: SyncErrorCode::ApproveMatchError,
            ..
        }
    ));
    assert_eq!(approval_of(&workbench, "c").await, Approval::Pending);

    let errors = workbench.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, SyncErrorCode::ApproveMatchError);

    workbench.clear_errors().await;
    assert!(workbench.errors().await.is_empty());
}

#[tokio::test]
async fn test_failed_bulk_reject_restores_every_match() {
    let service = Arc::new(MockService::with_matches(vec![
        candidate("a", 1, 0.95),
        candidate("p", 1, 0.40),
        candidate("q", 2, 0.30),
    ]));
    service.set(|s| s.fail_approval = true);
    let workbench = loaded(service.clone()).await;

    let err = workbench.reject_all().await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Sync {
            code: SyncErrorCode::BulkRejectError,
            ..
        }
    ));
    assert_eq!(approval_of(&workbench, "a").await, Approval::Approved);
    assert_eq!(approval_of(&workbench, "p").await, Approval::Pending);
    assert_eq!(approval_of(&workbench, "q").await, Approval::Pending);

    let calls = service.read(|s| s.approval_calls.clone());
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["p".to_string(), "q".to_string()]);
}

#[tokio::test]
async fn test_failed_sync_does_not_undo_a_reload() {
    let (mock, gate) = MockService::with_matches(reviewed_matches()).held();
    let service = Arc::new(mock);
    service.set(|s| s.fail_approval = true);
    let workbench = Arc::new(loaded(service.clone()).await);

    let task = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.reject("c").await })
    };
    for _ in 0..100 {
        if approval_of(&workbench, "c").await == Approval::Rejected {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(approval_of(&workbench, "c").await, Approval::Rejected);

    // Reload with a lower threshold while the reject is in flight
    workbench.set_threshold(50.0).await.unwrap();
    let summary = workbench.load_matches("job-0").await.unwrap();
    assert_eq!(summary.auto_approved, 3);

    gate.notify_one();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Sync {
            code: SyncErrorCode::RejectMatchError,
            ..
        }
    ));
    assert_eq!(approval_of(&workbench, "c").await, Approval::Approved);
    assert_eq!(workbench.errors().await[0].code, SyncErrorCode::RejectMatchError);
}

#[tokio::test]
async fn test_resolved_matches_are_final() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    let workbench = loaded(service.clone()).await;

    workbench.reject("c").await.unwrap();
    let err = workbench.approve("c").await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Validation(RedactionError::AlreadyResolved(_))
    ));

    // Nothing pending: no request at all
    assert_eq!(workbench.approve_all().await.unwrap(), 0);
    assert_eq!(service.read(|s| s.approval_calls.len()), 1);

    let err = workbench.approve("missing").await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Validation(RedactionError::MatchNotFound(_))
    ));
}

#[tokio::test]
async fn test_approve_high_confidence() {
    let service = Arc::new(MockService::with_matches(vec![
        candidate("x", 1, 0.85),
        candidate("y", 1, 0.70),
    ]));
    let workbench = loaded(service.clone()).await;

    assert_eq!(workbench.approve_high_confidence(Some(80.0)).await.unwrap(), 1);
    assert_eq!(approval_of(&workbench, "x").await, Approval::Approved);
    assert_eq!(approval_of(&workbench, "y").await, Approval::Pending);

    // Falls back to the current threshold (90): nothing qualifies
    assert_eq!(workbench.approve_high_confidence(None).await.unwrap(), 0);

    assert!(matches!(
        workbench.approve_high_confidence(Some(101.0)).await,
        Err(WorkbenchError::Validation(RedactionError::InvalidThreshold(_)))
    ));
}

#[tokio::test]
async fn test_lowering_threshold_unblocks_finalize() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    let workbench = loaded(service).await;
    assert!(!workbench.can_finalize().await);

    workbench.set_threshold(60.0).await.unwrap();
    assert!(workbench.can_finalize().await);
    // Not retroactive: "c" is still pending, just no longer blocking
    assert_eq!(approval_of(&workbench, "c").await, Approval::Pending);
    assert_eq!(workbench.stats().await.matches.auto_approvable, 1);

    assert!(workbench.set_threshold(-1.0).await.is_err());
    assert_eq!(workbench.threshold().await, 60.0);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_input_is_debounced() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    let workbench = loaded(service).await;

    for pct in [80.0, 70.0, 60.0] {
        workbench.set_threshold_debounced(pct).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(workbench.threshold().await, 90.0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(workbench.threshold().await, 60.0);

    assert!(matches!(
        workbench.set_threshold_debounced(150.0),
        Err(WorkbenchError::Validation(RedactionError::InvalidThreshold(_)))
    ));
}

#[tokio::test]
async fn test_finalize_submits_frozen_set() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    let workbench = loaded(service.clone()).await;
    workbench.register_pages(&[letter_page(1)]).await.unwrap();
    workbench.reject("c").await.unwrap();
    let manual = workbench
        .add_manual(1, Rect::new(10.0, 10.0, 50.0, 20.0), Some("signature".to_string()))
        .await
        .unwrap();

    let receipt = workbench.finalize().await.unwrap();
    assert_eq!(receipt.download_url, "https://files.example.com/doc-1.pdf");
    assert_eq!(
        workbench.download_url().await.as_deref(),
        Some("https://files.example.com/doc-1.pdf")
    );

    let requests = service.read(|s| s.finalize_requests.clone());
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].approved_match_ids,
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(requests[0].manual_redactions.len(), 1);
    assert_eq!(requests[0].manual_redactions[0].id, manual);

    let stats = workbench.stats().await;
    assert_eq!(stats.processing, ProcessingStatus::Completed);
    assert!(matches!(stats.workflow, WorkflowState::Completed { .. }));
    assert!(workbench.finalize().await.is_err());
}

#[tokio::test]
async fn test_finalize_cannot_start_twice() {
    let (mock, gate) = MockService::with_matches(vec![candidate("a", 1, 0.95)]).held();
    let service = Arc::new(mock);
    let workbench = Arc::new(loaded(service.clone()).await);

    let first = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.finalize().await })
    };
    let mut processing = false;
    for _ in 0..100 {
        if workbench.stats().await.processing == ProcessingStatus::Processing {
            processing = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(processing);
    assert!(!workbench.can_finalize().await);

    let second = workbench.finalize().await;
    assert!(matches!(
        second,
        Err(WorkbenchError::Validation(RedactionError::FinalizeInProgress))
    ));

    // Changes while in flight do not leak into the submitted request
    workbench.register_pages(&[letter_page(1)]).await.unwrap();
    workbench
        .add_manual(1, Rect::new(0.0, 0.0, 10.0, 10.0), None)
        .await
        .unwrap();

    gate.notify_one();
    first.await.unwrap().unwrap();
    let requests = service.read(|s| s.finalize_requests.clone());
    assert_eq!(requests.len(), 1);
    assert!(requests[0].manual_redactions.is_empty());
}

#[tokio::test]
async fn test_finalize_failure_is_retryable() {
    let service = Arc::new(MockService::with_matches(vec![candidate("a", 1, 0.95)]));
    service.set(|s| s.fail_finalize = true);
    let workbench = loaded(service.clone()).await;

    let err = workbench.finalize().await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Sync {
            code: SyncErrorCode::FinalizeError,
            ..
        }
    ));
    let stats = workbench.stats().await;
    assert_eq!(stats.processing, ProcessingStatus::Failed);
    assert!(matches!(stats.workflow, WorkflowState::Failed { .. }));
    assert_eq!(stats.matches.approved, 1);
    assert!(stats.can_finalize);
    assert_eq!(workbench.errors().await[0].code, SyncErrorCode::FinalizeError);

    service.set(|s| s.fail_finalize = false);
    workbench.finalize().await.unwrap();
    assert_eq!(service.read(|s| s.finalize_requests.len()), 2);
}

#[tokio::test]
async fn test_refused_finalize_keeps_failed_status() {
    let service = Arc::new(MockService::with_matches(vec![candidate("a", 1, 0.95)]));
    service.script_statuses(vec![JobStatus::new(JobState::Running, 10.0)]);
    service.set(|s| s.fail_finalize = true);
    let workbench = loaded(service.clone()).await;
    assert!(workbench.finalize().await.is_err());

    // A detection run over the failed document blocks finalization
    workbench.start_detection(None).await.unwrap();
    let err = workbench.finalize().await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Validation(RedactionError::InvalidTransition(_))
    ));
    assert_eq!(workbench.stats().await.processing, ProcessingStatus::Failed);
    assert_eq!(service.read(|s| s.finalize_requests.len()), 1);
    workbench.dispose().await;
}

#[tokio::test]
async fn test_finalize_refused_with_nothing_to_redact() {
    let service = Arc::new(MockService::with_matches(vec![candidate("a", 1, 0.20)]));
    let workbench = loaded(service.clone()).await;
    workbench.reject("a").await.unwrap();

    let err = workbench.finalize().await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::Validation(RedactionError::NotReady(_))
    ));
    assert!(service.read(|s| s.finalize_requests.is_empty()));
}

#[tokio::test]
async fn test_manual_redactions_from_drag() {
    let service = Arc::new(MockService::default());
    let workbench = Workbench::create("doc-2", &test_config(), service).unwrap();
    workbench
        .register_pages(&[letter_page(1), letter_page(2)])
        .await
        .unwrap();
    assert_eq!(workbench.workflow_state().await, WorkflowState::Idle);

    let id = workbench
        .add_manual_from_drag(1, Point::new(150.0, 90.0), Point::new(30.0, 60.0), None)
        .await
        .unwrap();
    // First manual rectangle opens the review
    assert_eq!(workbench.workflow_state().await, WorkflowState::Reviewing);

    let stored = workbench.manual_redactions().await;
    assert_eq!(stored[0].rect, Rect::new(30.0, 702.0, 120.0, 30.0));

    let overlays = workbench.overlays(1).await.unwrap();
    assert_eq!(overlays.manual.len(), 1);
    assert_eq!(overlays.manual[0].id, id);
    assert_eq!(overlays.manual[0].rect, Rect::new(30.0, 60.0, 120.0, 30.0));
    assert!(workbench.overlays(2).await.unwrap().manual.is_empty());

    assert!(matches!(
        workbench
            .add_manual_from_drag(1, Point::new(600.0, 10.0), Point::new(700.0, 40.0), None)
            .await,
        Err(WorkbenchError::Validation(RedactionError::OutOfBounds { page: 1 }))
    ));
    assert!(matches!(
        workbench
            .add_manual(9, Rect::new(0.0, 0.0, 1.0, 1.0), None)
            .await,
        Err(WorkbenchError::Validation(RedactionError::UnknownPage(9)))
    ));
    assert!(matches!(
        workbench.overlays(9).await,
        Err(WorkbenchError::NoFrame(9))
    ));
}

#[tokio::test]
async fn test_manual_undo_and_remove() {
    let service = Arc::new(MockService::default());
    let workbench = Workbench::create("doc-3", &test_config(), service).unwrap();
    workbench.register_pages(&[letter_page(1)]).await.unwrap();

    let first = workbench
        .add_manual(1, Rect::new(10.0, 10.0, 10.0, 10.0), None)
        .await
        .unwrap();
    let second = workbench
        .add_manual(1, Rect::new(40.0, 40.0, 10.0, 10.0), None)
        .await
        .unwrap();

    assert_eq!(workbench.undo_manual().await.map(|r| r.id), Some(second));
    assert!(workbench.remove_manual(first).await);
    assert!(!workbench.remove_manual(first).await);
    assert_eq!(workbench.undo_manual().await, None);
}

#[tokio::test]
async fn test_manual_only_document_can_finalize() {
    let service = Arc::new(MockService::default());
    let workbench = Workbench::create("doc-4", &test_config(), service.clone()).unwrap();
    workbench.register_pages(&[letter_page(1)]).await.unwrap();
    assert!(!workbench.can_finalize().await);

    workbench
        .add_manual(1, Rect::new(100.0, 100.0, 200.0, 40.0), None)
        .await
        .unwrap();
    assert!(workbench.can_finalize().await);
    workbench.finalize().await.unwrap();

    let requests = service.read(|s| s.finalize_requests.clone());
    assert!(requests[0].approved_match_ids.is_empty());
    assert_eq!(requests[0].manual_redactions.len(), 1);
}

#[tokio::test]
async fn test_plan_merges_touching_rectangles() {
    let service = Arc::new(MockService::with_matches(vec![candidate("a", 1, 0.95)]));
    let workbench = loaded(service).await;
    workbench.register_pages(&[letter_page(1)]).await.unwrap();
    workbench
        .add_manual(1, Rect::new(180.0, 200.0, 40.0, 20.0), None)
        .await
        .unwrap();

    let plan = workbench.plan().await;
    assert_eq!(plan.pages[&1], vec![Rect::new(100.0, 200.0, 120.0, 20.0)]);
}

#[tokio::test]
async fn test_dispose_clears_state() {
    let service = Arc::new(MockService::with_matches(reviewed_matches()));
    let workbench = loaded(service.clone()).await;
    workbench.dispose().await;

    // A fresh session starts from scratch
    let workbench = Workbench::create("doc-1", &test_config(), service).unwrap();
    assert_eq!(workbench.stats().await.matches.total, 0);
    assert_eq!(workbench.workflow_state().await, WorkflowState::Idle);
}
