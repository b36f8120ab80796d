//! Redaction review core
//!
//! Pure, synchronous building blocks of the redaction workbench:
//! - `geometry` / `coords`: rectangle math and document ⇄ display conversion
//! - `matches` / `command`: detected candidates, tri-state approval and
//!   optimistic approval commands
//! - `manual`: user-drawn rectangles with single-level undo
//! - `finalize` / `workflow`: the gate and state machine around finalization
//!
//! Network calls, polling and timers live in the workbench app; nothing in
//! this crate blocks or spawns.

pub mod command;
pub mod coords;
pub mod error;
pub mod finalize;
pub mod geometry;
pub mod job;
pub mod manual;
pub mod matches;
pub mod overlay;
pub mod page;
pub mod plan;
pub mod workflow;

pub use command::{ApprovalAction, ApprovalCommand};
pub use coords::{to_display, to_document, PageFrame};
pub use error::{ErrorLog, RedactionError, SyncError, SyncErrorCode};
pub use finalize::{
    can_finalize, FinalizationGate, FinalizeReceipt, FinalizeRequest, ProcessingStatus,
};
pub use geometry::{Point, Rect};
pub use job::{JobId, JobState, JobStatus};
pub use manual::{ManualId, ManualRedaction, ManualRedactionStore};
pub use matches::{Approval, LoadSummary, MatchId, MatchStats, MatchStore, RedactionMatch};
pub use overlay::{ManualOverlay, MatchOverlay};
pub use page::PageGeometry;
pub use plan::{PlanOptions, RedactionPlan};
pub use workflow::{Workflow, WorkflowState};

/// Highest page number accepted when the document's page count is unknown.
/// A page needs at least one indirect object and PDF readers stop at
/// 8,388,607 of them.
pub const MAX_PAGE_NUMBER: u32 = 8_388_607;

/// Parse a page range string like "1-3, 5, 8-10" into sorted unique page
/// numbers. Pages are 1-indexed; pages past `page_count`, or past
/// [`MAX_PAGE_NUMBER`] when the count is unknown, are rejected.
pub fn parse_ranges(input: &str, page_count: Option<u32>) -> Result<Vec<u32>, RedactionError> {
    let last = page_count.unwrap_or(MAX_PAGE_NUMBER).min(MAX_PAGE_NUMBER);
    let mut spans = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_page(start)?, parse_page(end)?),
            None => {
                let page = parse_page(part)?;
                (page, page)
            }
        };

        if start > end {
            return Err(RedactionError::InvalidRange(format!(
                "Start {} > end {}",
                start, end
            )));
        }
        if end > last {
            return Err(RedactionError::InvalidRange(format!(
                "Page {} is past the last page ({})",
                end, last
            )));
        }
        spans.push((start, end));
    }

    if spans.is_empty() {
        return Err(RedactionError::InvalidRange("No pages selected".to_string()));
    }

    // Merge overlapping spans so every page is expanded once
    spans.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(prev) if start <= prev.1.saturating_add(1) => prev.1 = prev.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    Ok(merged.into_iter().flat_map(|(start, end)| start..=end).collect())
}

fn parse_page(s: &str) -> Result<u32, RedactionError> {
    let s = s.trim();
    match s.parse::<u32>() {
        Ok(0) => Err(RedactionError::InvalidRange(
            "Pages are numbered from 1".to_string(),
        )),
        Ok(page) => Ok(page),
        Err(_) => Err(RedactionError::InvalidRange(format!("Invalid page: {}", s))),
    }
}
