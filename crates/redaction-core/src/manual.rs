//! User-drawn redaction rectangles
//!
//! Rectangles are kept in document space and in insertion order. There is
//! no redo history: `undo_last` simply drops the newest rectangle that is
//! still in the list, so repeated undos walk backwards through it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::geometry::{validate, Rect};
use crate::page::PageGeometry;

pub type ManualId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualRedaction {
    pub id: ManualId,
    /// Page number (1-indexed)
    pub page: u32,
    /// Document-space rectangle
    pub rect: Rect,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ManualRedactionStore {
    /// Document-space `(width, height)` per page
    page_sizes: HashMap<u32, (f64, f64)>,
    redactions: Vec<ManualRedaction>,
}

impl ManualRedactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the bounds of every page of a document
    pub fn with_pages(pages: &[PageGeometry]) -> Self {
        let mut store = Self::new();
        for page in pages {
            store.set_page_size(page.page_num, page.width, page.height);
        }
        store
    }

    pub fn set_page_size(&mut self, page: u32, width: f64, height: f64) {
        self.page_sizes.insert(page, (width, height));
    }

    pub fn page_size(&self, page: u32) -> Option<(f64, f64)> {
        self.page_sizes.get(&page).copied()
    }

    /// Number of pages with known bounds
    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    /// Append a rectangle if it fits inside its page.
    ///
    /// Invalid input (unknown page, empty or out-of-bounds rectangle) is
    /// ignored and yields `None`; callers validate beforehand when they
    /// need to report why.
    pub fn add(&mut self, page: u32, rect: Rect, reason: Option<String>) -> Option<ManualId> {
        let (width, height) = self.page_size(page)?;
        if !validate(&rect, width, height) {
            debug!(page, ?rect, "Ignoring out-of-bounds manual redaction");
            return None;
        }

        let redaction = ManualRedaction {
            id: Uuid::new_v4(),
            page,
            rect,
            created_at: Utc::now(),
            reason,
        };
        let id = redaction.id;
        self.redactions.push(redaction);
        debug!(%id, page, "Added manual redaction");
        Some(id)
    }

    /// Remove by id; returns whether anything was removed
    pub fn remove(&mut self, id: ManualId) -> bool {
        if let Some(pos) = self.redactions.iter().position(|r| r.id == id) {
            self.redactions.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn remove_all(&mut self) {
        self.redactions.clear();
    }

    /// Drop the most recently added rectangle still in the list
    pub fn undo_last(&mut self) -> Option<ManualRedaction> {
        let undone = self.redactions.pop();
        if let Some(r) = &undone {
            debug!(id = %r.id, "Undid manual redaction");
        }
        undone
    }

    pub fn get(&self, id: ManualId) -> Option<&ManualRedaction> {
        self.redactions.iter().find(|r| r.id == id)
    }

    pub fn redactions(&self) -> &[ManualRedaction] {
        &self.redactions
    }

    pub fn redactions_for_page(&self, page: u32) -> Vec<&ManualRedaction> {
        self.redactions.iter().filter(|r| r.page == page).collect()
    }

    pub fn len(&self) -> usize {
        self.redactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redactions.is_empty()
    }
}
