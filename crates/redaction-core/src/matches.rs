//! Redaction candidates proposed by the detection service
//!
//! The store owns every match of the current document together with the
//! confidence threshold. Matches arrive `Pending`; the ones scoring at or
//! above the threshold are approved once, during the load that brings them
//! in. Later threshold changes never touch a resolved match, they only
//! change which `Pending` matches count as auto-approvable and therefore
//! which ones block finalization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RedactionError;
use crate::geometry::Rect;

pub type MatchId = String;

/// Absorbs `0.29 * 100.0 == 28.999999999999996` style artifacts
const SCORE_EPSILON: f64 = 1e-9;

pub const DEFAULT_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Approval {
    pub fn is_resolved(self) -> bool {
        !matches!(self, Approval::Pending)
    }
}

impl std::fmt::Display for Approval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Approval::Pending => write!(f, "pending"),
            Approval::Approved => write!(f, "approved"),
            Approval::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionMatch {
    pub id: MatchId,
    pub original_text: String,
    pub matched_text: String,
    /// Page number (1-indexed)
    pub page: u32,
    /// Document-space rectangle
    pub rect: Rect,
    /// Detector score in `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub approval: Approval,
}

impl RedactionMatch {
    /// Score as a percentage, comparable with the threshold
    pub fn score_pct(&self) -> f64 {
        self.confidence * 100.0
    }

    pub fn meets(&self, threshold_pct: f64) -> bool {
        self.score_pct() + SCORE_EPSILON >= threshold_pct
    }
}

/// Counts by approval state, for the review sidebar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Pending matches at or above the current threshold
    pub auto_approvable: usize,
    /// Pending matches below the threshold; these block finalization
    pub pending_below_threshold: usize,
}

/// Outcome of [`MatchStore::load`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub auto_approved: usize,
    pub duplicates_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct MatchStore {
    matches: Vec<RedactionMatch>,
    index: HashMap<MatchId, usize>,
    threshold: f64,
    /// Bumped whenever the collection is replaced
    generation: u64,
}

impl Default for MatchStore {
    fn default() -> Self {
        Self {
            matches: Vec::new(),
            index: HashMap::new(),
            threshold: DEFAULT_THRESHOLD,
            generation: 0,
        }
    }
}

impl MatchStore {
    pub fn new(threshold: f64) -> Result<Self, RedactionError> {
        check_threshold(threshold)?;
        Ok(Self {
            threshold,
            ..Self::default()
        })
    }

    /// Replace the collection with a job result.
    ///
    /// Incoming approvals are ignored: everything starts `Pending`, then
    /// matches meeting the current threshold are approved as part of the
    /// same load. Repeated ids keep their first occurrence.
    pub fn load(&mut self, incoming: Vec<RedactionMatch>) -> LoadSummary {
        let mut summary = LoadSummary::default();
        self.matches.clear();
        self.index.clear();
        self.generation += 1;

        for mut m in incoming {
            if self.index.contains_key(&m.id) {
                warn!(match_id = %m.id, "Skipping duplicate match id");
                summary.duplicates_skipped += 1;
                continue;
            }
            m.approval = if m.meets(self.threshold) {
                summary.auto_approved += 1;
                Approval::Approved
            } else {
                Approval::Pending
            };
            self.index.insert(m.id.clone(), self.matches.len());
            self.matches.push(m);
        }

        summary.loaded = self.matches.len();
        debug!(
            loaded = summary.loaded,
            auto_approved = summary.auto_approved,
            threshold = self.threshold,
            "Loaded matches"
        );
        summary
    }

    /// Identifies the current collection; changes on every `load` and `clear`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Change the threshold. Resolved matches are left as they are.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), RedactionError> {
        check_threshold(threshold)?;
        self.threshold = threshold;
        debug!(threshold, "Threshold updated");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&RedactionMatch> {
        self.index.get(id).map(|&i| &self.matches[i])
    }

    pub fn matches(&self) -> &[RedactionMatch] {
        &self.matches
    }

    pub fn matches_for_page(&self, page: u32) -> Vec<&RedactionMatch> {
        self.matches.iter().filter(|m| m.page == page).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// True for a `Pending` match the current threshold would accept
    pub fn is_auto_approvable(&self, m: &RedactionMatch) -> bool {
        m.approval == Approval::Pending && m.meets(self.threshold)
    }

    pub fn stats(&self) -> MatchStats {
        let mut stats = MatchStats {
            total: self.matches.len(),
            ..MatchStats::default()
        };
        for m in &self.matches {
            match m.approval {
                Approval::Pending if m.meets(self.threshold) => {
                    stats.pending += 1;
                    stats.auto_approvable += 1;
                }
                Approval::Pending => {
                    stats.pending += 1;
                    stats.pending_below_threshold += 1;
                }
                Approval::Approved => stats.approved += 1,
                Approval::Rejected => stats.rejected += 1,
            }
        }
        stats
    }

    pub fn pending_below_threshold_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.approval == Approval::Pending && !m.meets(self.threshold))
            .count()
    }

    pub fn approved_count(&self) -> usize {
        self.count(Approval::Approved)
    }

    pub fn count(&self, approval: Approval) -> usize {
        self.matches
            .iter()
            .filter(|m| m.approval == approval)
            .count()
    }

    /// Ids of approved matches in load order
    pub fn approved_ids(&self) -> Vec<MatchId> {
        self.ids_where(|m| m.approval == Approval::Approved)
    }

    pub fn pending_ids(&self) -> Vec<MatchId> {
        self.ids_where(|m| m.approval == Approval::Pending)
    }

    /// Pending matches scoring at or above `threshold_pct`
    pub fn pending_ids_at_or_above(&self, threshold_pct: f64) -> Vec<MatchId> {
        self.ids_where(|m| m.approval == Approval::Pending && m.meets(threshold_pct))
    }

    fn ids_where(&self, pred: impl Fn(&RedactionMatch) -> bool) -> Vec<MatchId> {
        self.matches
            .iter()
            .filter(|m| pred(m))
            .map(|m| m.id.clone())
            .collect()
    }

    /// Low-level state write used by approval commands
    pub(crate) fn set_approval(
        &mut self,
        id: &str,
        approval: Approval,
    ) -> Result<Approval, RedactionError> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| RedactionError::MatchNotFound(id.to_string()))?;
        let previous = self.matches[i].approval;
        self.matches[i].approval = approval;
        Ok(previous)
    }

    /// Drop everything, e.g. when the document is closed
    pub fn clear(&mut self) {
        self.matches.clear();
        self.index.clear();
        self.generation += 1;
    }
}

/// Thresholds are percentages in [0, 100]
pub fn check_threshold(threshold: f64) -> Result<(), RedactionError> {
    if (0.0..=100.0).contains(&threshold) {
        Ok(())
    } else {
        Err(RedactionError::InvalidThreshold(threshold))
    }
}
