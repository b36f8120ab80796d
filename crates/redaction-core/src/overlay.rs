//! Display-space projections for the overlay layer
//!
//! Stores keep everything in document space. These helpers project the
//! rectangles of one page through its current [`PageFrame`] so the
//! renderer can position overlays directly.

use serde::Serialize;

use crate::coords::{to_display, PageFrame};
use crate::geometry::Rect;
use crate::manual::{ManualId, ManualRedactionStore};
use crate::matches::{Approval, MatchId, MatchStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOverlay {
    pub id: MatchId,
    pub page: u32,
    /// Display-space rectangle
    pub rect: Rect,
    pub approval: Approval,
    pub confidence: f64,
    /// Pending, but at or above the current threshold
    pub auto_approvable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualOverlay {
    pub id: ManualId,
    pub page: u32,
    /// Display-space rectangle
    pub rect: Rect,
}

pub fn project_matches(store: &MatchStore, page: u32, frame: &PageFrame) -> Vec<MatchOverlay> {
    store
        .matches_for_page(page)
        .into_iter()
        .map(|m| MatchOverlay {
            id: m.id.clone(),
            page: m.page,
            rect: to_display(&m.rect, frame),
            approval: m.approval,
            confidence: m.confidence,
            auto_approvable: store.is_auto_approvable(m),
        })
        .collect()
}

pub fn project_manual(
    store: &ManualRedactionStore,
    page: u32,
    frame: &PageFrame,
) -> Vec<ManualOverlay> {
    store
        .redactions_for_page(page)
        .into_iter()
        .map(|r| ManualOverlay {
            id: r.id,
            page: r.page,
            rect: to_display(&r.rect, frame),
        })
        .collect()
}
