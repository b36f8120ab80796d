//! Per-page preview of what finalization will black out
//!
//! Approved matches and manual rectangles are padded, optionally snapped to
//! a grid, then merged where they touch. The plan is a preview only; the
//! finalize request always carries the raw ids and rectangles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{expand, merge_overlapping, snap_to_grid, validate, Rect};
use crate::manual::ManualRedactionStore;
use crate::matches::{Approval, MatchStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Padding in points added on every side
    #[serde(default)]
    pub margin: f64,
    /// Merge rectangles closer than this many points
    #[serde(default)]
    pub merge_tolerance: f64,
    #[serde(default)]
    pub grid_size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedactionPlan {
    /// Document-space rectangles keyed by page number
    pub pages: BTreeMap<u32, Vec<Rect>>,
}

impl RedactionPlan {
    pub fn build(matches: &MatchStore, manual: &ManualRedactionStore, options: &PlanOptions) -> Self {
        let mut raw: BTreeMap<u32, Vec<Rect>> = BTreeMap::new();
        let approved = matches
            .matches()
            .iter()
            .filter(|m| m.approval == Approval::Approved)
            .map(|m| (m.page, m.rect));
        let drawn = manual.redactions().iter().map(|r| (r.page, r.rect));
        for (page, rect) in approved.chain(drawn) {
            raw.entry(page).or_default().push(rect);
        }

        let pages = raw
            .into_iter()
            .map(|(page, rects)| {
                let bounds = manual.page_size(page);
                let prepared: Vec<Rect> = rects
                    .iter()
                    .map(|r| prepare(r, options, bounds))
                    .collect();
                (page, merge_overlapping(&prepared, options.merge_tolerance))
            })
            .collect();

        Self { pages }
    }

    pub fn rect_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Pad and snap one rectangle, keeping the original when the adjusted one
/// would leave the page or collapse.
fn prepare(rect: &Rect, options: &PlanOptions, bounds: Option<(f64, f64)>) -> Rect {
    let mut adjusted = expand(rect, options.margin);
    if let Some(grid) = options.grid_size {
        adjusted = snap_to_grid(&adjusted, grid);
    }
    let fits = match bounds {
        Some((w, h)) => validate(&adjusted, w, h),
        None => adjusted.has_positive_area(),
    };
    if fits {
        adjusted
    } else {
        *rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::test_support::candidate;
    use crate::matches::RedactionMatch;
    use pretty_assertions::assert_eq;

    fn at(id: &str, page: u32, rect: Rect) -> RedactionMatch {
        RedactionMatch {
            rect,
            ..candidate(id, page, 0.99)
        }
    }

    #[test]
    fn test_plan_merges_matches_and_manual() {
        let mut matches = MatchStore::new(90.0).unwrap();
        matches.load(vec![
            at("a", 1, Rect::new(100.0, 100.0, 100.0, 50.0)),
            RedactionMatch {
                confidence: 0.1,
                ..at("skip", 1, Rect::new(400.0, 400.0, 10.0, 10.0))
            },
        ]);
        let mut manual = ManualRedactionStore::new();
        manual.set_page_size(1, 612.0, 792.0);
        manual.set_page_size(2, 612.0, 792.0);
        manual.add(1, Rect::new(150.0, 120.0, 100.0, 50.0), None);
        manual.add(2, Rect::new(10.0, 10.0, 10.0, 10.0), None);

        let plan = RedactionPlan::build(&matches, &manual, &PlanOptions::default());
        assert_eq!(plan.pages[&1], vec![Rect::new(100.0, 100.0, 150.0, 70.0)]);
        assert_eq!(plan.pages[&2].len(), 1);
        assert_eq!(plan.rect_count(), 2);
    }

    #[test]
    fn test_margin_falls_back_at_page_edge() {
        let mut matches = MatchStore::new(90.0).unwrap();
        matches.load(vec![
            at("edge", 1, Rect::new(0.0, 0.0, 10.0, 10.0)),
            at("inner", 1, Rect::new(100.0, 100.0, 10.0, 10.0)),
        ]);
        let mut manual = ManualRedactionStore::new();
        manual.set_page_size(1, 612.0, 792.0);

        let options = PlanOptions {
            margin: 2.0,
            ..PlanOptions::default()
        };
        let plan = RedactionPlan::build(&matches, &manual, &options);
        assert_eq!(
            plan.pages[&1],
            vec![
                Rect::new(0.0, 0.0, 10.0, 10.0),
                Rect::new(98.0, 98.0, 14.0, 14.0)
            ]
        );
    }

    #[test]
    fn test_empty_plan() {
        let plan = RedactionPlan::build(
            &MatchStore::default(),
            &ManualRedactionStore::new(),
            &PlanOptions::default(),
        );
        assert!(plan.is_empty());
    }
}
