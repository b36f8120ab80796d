//! Optimistic approval commands
//!
//! A command captures the approvals it is about to overwrite, applies the
//! new state locally, and is later either confirmed (the service accepted
//! it) or rolled back (the service call failed). Rollback restores the
//! captured snapshot exactly, unless the match list has been reloaded in
//! the meantime: the snapshot then describes matches that no longer exist
//! and is discarded.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RedactionError, SyncErrorCode};
use crate::matches::{check_threshold, Approval, MatchId, MatchStore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApprovalAction {
    Approve,
    Reject,
    ApproveAll,
    RejectAll,
    ApproveHighConfidence { threshold_pct: f64 },
}

impl ApprovalAction {
    pub fn target(&self) -> Approval {
        match self {
            ApprovalAction::Approve
            | ApprovalAction::ApproveAll
            | ApprovalAction::ApproveHighConfidence { .. } => Approval::Approved,
            ApprovalAction::Reject | ApprovalAction::RejectAll => Approval::Rejected,
        }
    }

    pub fn is_bulk(&self) -> bool {
        !matches!(self, ApprovalAction::Approve | ApprovalAction::Reject)
    }

    /// Error code reported when the service rejects this action
    pub fn error_code(&self) -> SyncErrorCode {
        match self {
            ApprovalAction::Approve => SyncErrorCode::ApproveMatchError,
            ApprovalAction::Reject => SyncErrorCode::RejectMatchError,
            ApprovalAction::ApproveAll | ApprovalAction::ApproveHighConfidence { .. } => {
                SyncErrorCode::BulkApproveError
            }
            ApprovalAction::RejectAll => SyncErrorCode::BulkRejectError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Prepared,
    Applied,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone)]
pub struct ApprovalCommand {
    action: ApprovalAction,
    ids: Vec<MatchId>,
    previous: Vec<(MatchId, Approval)>,
    /// `MatchStore::generation` the ids were selected from
    generation: u64,
    state: CommandState,
}

impl ApprovalCommand {
    /// Approve or reject one match. Only `Pending` matches can be resolved.
    pub fn single(store: &MatchStore, id: &str, target: Approval) -> Result<Self, RedactionError> {
        let action = match target {
            Approval::Approved => ApprovalAction::Approve,
            Approval::Rejected => ApprovalAction::Reject,
            Approval::Pending => {
                return Err(RedactionError::InvalidTransition(
                    "matches cannot be moved back to pending".to_string(),
                ))
            }
        };
        let m = store
            .get(id)
            .ok_or_else(|| RedactionError::MatchNotFound(id.to_string()))?;
        if m.approval.is_resolved() {
            return Err(RedactionError::AlreadyResolved(id.to_string()));
        }
        Ok(Self::prepared(store, action, vec![id.to_string()]))
    }

    /// Bulk action over the matches that are `Pending` right now.
    /// The selection may be empty.
    pub fn bulk(store: &MatchStore, action: ApprovalAction) -> Result<Self, RedactionError> {
        let ids = match action {
            ApprovalAction::ApproveAll | ApprovalAction::RejectAll => store.pending_ids(),
            ApprovalAction::ApproveHighConfidence { threshold_pct } => {
                check_threshold(threshold_pct)?;
                store.pending_ids_at_or_above(threshold_pct)
            }
            ApprovalAction::Approve | ApprovalAction::Reject => {
                return Err(RedactionError::InvalidTransition(
                    "single-match action used as bulk".to_string(),
                ))
            }
        };
        Ok(Self::prepared(store, action, ids))
    }

    fn prepared(store: &MatchStore, action: ApprovalAction, ids: Vec<MatchId>) -> Self {
        Self {
            action,
            ids,
            previous: Vec::new(),
            generation: store.generation(),
            state: CommandState::Prepared,
        }
    }

    pub fn action(&self) -> ApprovalAction {
        self.action
    }

    pub fn target(&self) -> Approval {
        self.action.target()
    }

    pub fn ids(&self) -> &[MatchId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Write the target approval locally, remembering what it replaced
    pub fn apply(&mut self, store: &mut MatchStore) -> Result<(), RedactionError> {
        if self.state != CommandState::Prepared {
            return Err(RedactionError::InvalidTransition(format!(
                "cannot apply a command in state {:?}",
                self.state
            )));
        }
        if store.generation() != self.generation {
            return Err(RedactionError::InvalidTransition(
                "match list was reloaded after the command was prepared".to_string(),
            ));
        }
        let target = self.target();
        let mut previous = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            match store.set_approval(id, target) {
                Ok(before) => previous.push((id.clone(), before)),
                Err(e) => {
                    // Undo the part already written before reporting
                    restore(store, &previous);
                    return Err(e);
                }
            }
        }
        debug!(action = ?self.action, count = self.ids.len(), "Applied approval locally");
        self.previous = previous;
        self.state = CommandState::Applied;
        Ok(())
    }

    /// The service accepted the change; the local state is final
    pub fn confirm(&mut self) {
        if self.state == CommandState::Applied {
            self.state = CommandState::Confirmed;
            self.previous.clear();
        }
    }

    /// The service rejected the change; restore the snapshot
    pub fn rollback(&mut self, store: &mut MatchStore) {
        if self.state != CommandState::Applied {
            return;
        }
        if store.generation() == self.generation {
            warn!(action = ?self.action, count = self.previous.len(), "Rolling back approval");
            restore(store, &self.previous);
        } else {
            debug!(action = ?self.action, "Match list reloaded, nothing to roll back");
        }
        self.previous.clear();
        self.state = CommandState::RolledBack;
    }
}

fn restore(store: &mut MatchStore, snapshot: &[(MatchId, Approval)]) {
    for (id, approval) in snapshot {
        // Every id was written under this generation, so it is still present
        if let Err(e) = store.set_approval(id, *approval) {
            warn!(match_id = %id, error = %e, "Could not restore approval");
        }
    }
}
