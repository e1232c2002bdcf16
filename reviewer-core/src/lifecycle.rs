//! Pull request lifecycle rules.
//!
//! A pull request starts `Open` and may move to `Merged` exactly once.
//! `Merged` is terminal: the reviewer set is frozen and merging again is a
//! no-op. These functions are pure so every store and the engine apply the
//! same rules.

use chrono::{DateTime, Utc};

use crate::error::AssignmentError;
use crate::model::{PullRequest, PullRequestStatus};

/// What a merge request should do given the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Write `Merged` and stamp `merged_at`.
    Merge,
    /// Return the current snapshot unchanged.
    AlreadyMerged,
}

/// Whether `from -> to` is a legal status change.
pub fn can_transition(from: PullRequestStatus, to: PullRequestStatus) -> bool {
    matches!(
        (from, to),
        (PullRequestStatus::Open, PullRequestStatus::Merged)
    )
}

pub fn decide_merge(status: PullRequestStatus) -> MergeDecision {
    if can_transition(status, PullRequestStatus::Merged) {
        MergeDecision::Merge
    } else {
        MergeDecision::AlreadyMerged
    }
}

/// Reviewer changes are only legal while the pull request is open.
pub fn ensure_reassignable(pr: &PullRequest) -> Result<(), AssignmentError> {
    match pr.status {
        PullRequestStatus::Open => Ok(()),
        PullRequestStatus::Merged => Err(AssignmentError::PrMerged(pr.id.clone())),
    }
}

/// Apply a merge to an in-memory snapshot.
///
/// Returns `true` if the status changed. A merged pull request keeps its
/// original `merged_at`.
pub fn apply_merge(pr: &mut PullRequest, merged_at: DateTime<Utc>) -> bool {
    match decide_merge(pr.status) {
        MergeDecision::Merge => {
            pr.status = PullRequestStatus::Merged;
            pr.merged_at = Some(merged_at);
            true
        }
        MergeDecision::AlreadyMerged => false,
    }
}
