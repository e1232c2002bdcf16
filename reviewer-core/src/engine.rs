//! Reviewer assignment engine.
//!
//! The engine is stateless: every call reads what it needs through the
//! [`Directory`] and [`PullRequestStore`] contracts, decides, and commits with
//! a single atomic store write. It can be shared freely between concurrent
//! request handlers.
//!
//! All precondition checks happen before the write. The store re-validates
//! the write's own preconditions at commit time, and any conflict it reports
//! is mapped back onto the engine's error taxonomy. The engine never retries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{AssignmentError, RepositoryError, WriteConflict};
use crate::lifecycle::{self, MergeDecision};
use crate::model::{PullRequest, PullRequestId, PullRequestSummary, UserId};
use crate::repository::{Directory, PullRequestStore, Repository};
use crate::selection::{self, MAX_REVIEWERS};

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum reviewers assigned when a pull request is created. Values
    /// above [`MAX_REVIEWERS`] are clamped to it.
    pub max_reviewers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_reviewers: MAX_REVIEWERS,
        }
    }
}

impl EngineConfig {
    fn reviewer_cap(&self) -> usize {
        self.max_reviewers.min(MAX_REVIEWERS)
    }
}

/// Outcome of a successful reassignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub replaced_by: UserId,
    pub pull_request: PullRequest,
}

pub struct ReviewerAssignmentEngine {
    directory: Arc<dyn Directory>,
    store: Arc<dyn PullRequestStore>,
    config: EngineConfig,
}

impl ReviewerAssignmentEngine {
    pub fn new(directory: Arc<dyn Directory>, store: Arc<dyn PullRequestStore>) -> Self {
        Self::with_config(directory, store, EngineConfig::default())
    }

    pub fn with_config(
        directory: Arc<dyn Directory>,
        store: Arc<dyn PullRequestStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            store,
            config,
        }
    }

    /// Build an engine whose directory and store are the same backend.
    pub fn from_repository<R: Repository + 'static>(repo: Arc<R>, config: EngineConfig) -> Self {
        let directory: Arc<dyn Directory> = repo.clone();
        let store: Arc<dyn PullRequestStore> = repo;
        Self::with_config(directory, store, config)
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Create an open pull request and assign up to `max_reviewers` active
    /// teammates of the author, chosen uniformly at random.
    pub async fn create_pull_request(
        &self,
        id: PullRequestId,
        name: String,
        author_id: UserId,
    ) -> Result<PullRequest, AssignmentError> {
        if self.store.pull_request_exists(&id).await? {
            return Err(AssignmentError::AlreadyExists(id));
        }

        let author = self
            .directory
            .get_user(&author_id)
            .await?
            .ok_or(AssignmentError::AuthorNotFound(author_id))?;

        let teammates = self
            .directory
            .active_teammates(&author.team_name, &author.id)
            .await?;
        let excluded = HashSet::from([author.id.clone()]);
        let pool = selection::candidate_pool(&teammates, &excluded);
        let reviewers = choose_reviewers(&pool, self.config.reviewer_cap());

        let pr = PullRequest::open(id.clone(), name, author.id, reviewers, Utc::now());
        match self.store.create_pull_request(&pr).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate { .. }) => {
                // Lost a race with a concurrent create for the same id
                return Err(AssignmentError::AlreadyExists(id));
            }
            Err(e) => {
                error!("Failed to create pull request {}: {}", id, e);
                return Err(e.into());
            }
        }

        info!(
            "Created pull request {} by {} with {} reviewer(s) from a pool of {}",
            id,
            pr.author_id,
            pr.reviewers.len(),
            pool.len()
        );
        self.reload(&id).await
    }

    /// Merge a pull request. Merging an already merged pull request returns
    /// it unchanged.
    pub async fn merge_pull_request(
        &self,
        id: PullRequestId,
    ) -> Result<PullRequest, AssignmentError> {
        let pr = self.fetch(&id).await?;

        match lifecycle::decide_merge(pr.status) {
            MergeDecision::AlreadyMerged => {
                debug!("Pull request {} already merged", id);
                Ok(pr)
            }
            MergeDecision::Merge => {
                self.store
                    .set_merged(&id, Utc::now())
                    .await
                    .inspect_err(|e| error!("Failed to merge pull request {}: {}", id, e))?;
                info!("Merged pull request {}", id);
                self.reload(&id).await
            }
        }
    }

    /// Replace `old_reviewer` on an open pull request with a random active
    /// teammate of theirs who is neither the author nor already reviewing.
    pub async fn reassign_reviewer(
        &self,
        id: PullRequestId,
        old_reviewer: UserId,
    ) -> Result<Reassignment, AssignmentError> {
        let pr = self.fetch(&id).await?;
        lifecycle::ensure_reassignable(&pr)?;

        if !pr.has_reviewer(&old_reviewer) {
            return Err(AssignmentError::NotAssigned {
                pull_request: id,
                reviewer: old_reviewer,
            });
        }

        let old_user = self
            .directory
            .get_user(&old_reviewer)
            .await?
            .ok_or_else(|| AssignmentError::UserNotFound(old_reviewer.clone()))?;

        let teammates = self
            .directory
            .active_teammates(&old_user.team_name, &old_user.id)
            .await?;
        let excluded: HashSet<UserId> = pr
            .reviewers
            .iter()
            .cloned()
            .chain(std::iter::once(pr.author_id.clone()))
            .collect();
        let pool = selection::candidate_pool(&teammates, &excluded);

        let Some(new_reviewer) = choose_replacement(&pool) else {
            return Err(AssignmentError::NoCandidate(id));
        };

        if let Err(e) = self
            .store
            .swap_reviewer(&id, &old_reviewer, &new_reviewer)
            .await
        {
            return Err(swap_error(&id, &old_reviewer, e));
        }

        info!(
            "Reassigned pull request {}: {} replaced by {}",
            id, old_reviewer, new_reviewer
        );
        let pull_request = self.reload(&id).await?;
        Ok(Reassignment {
            replaced_by: new_reviewer,
            pull_request,
        })
    }

    /// Pull requests the user currently reviews, newest first.
    pub async fn pull_requests_for_reviewer(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PullRequestSummary>, AssignmentError> {
        if self.directory.get_user(&user_id).await?.is_none() {
            return Err(AssignmentError::UserNotFound(user_id));
        }
        Ok(self.store.pull_requests_by_reviewer(&user_id).await?)
    }

    async fn fetch(&self, id: &PullRequestId) -> Result<PullRequest, AssignmentError> {
        self.store
            .get_pull_request(id)
            .await?
            .ok_or_else(|| AssignmentError::NotFound(id.clone()))
    }

    /// Re-read after a successful write. Nothing deletes pull requests, so a
    /// missing row here means the store is inconsistent.
    async fn reload(&self, id: &PullRequestId) -> Result<PullRequest, AssignmentError> {
        match self.store.get_pull_request(id).await? {
            Some(pr) => Ok(pr),
            None => {
                error!("Pull request {} missing right after a successful write", id);
                Err(AssignmentError::StorageFailure(RepositoryError::corruption(
                    format!("pull request {} vanished after write", id),
                )))
            }
        }
    }
}

// The thread-local generator is not `Send`, so it must never live across an
// await point. These wrappers scope it to a synchronous call.

fn choose_reviewers(pool: &[UserId], max: usize) -> Vec<UserId> {
    selection::select_reviewers(pool, max, &mut rand::rng())
}

fn choose_replacement(pool: &[UserId]) -> Option<UserId> {
    selection::select_replacement(pool, &mut rand::rng())
}

/// Map a failed swap onto the engine's taxonomy.
fn swap_error(id: &PullRequestId, old: &UserId, err: RepositoryError) -> AssignmentError {
    match err {
        RepositoryError::Conflict(conflict) => {
            warn!(
                "Reassignment of {} on pull request {} lost a race: {}",
                old, id, conflict
            );
            match conflict {
                WriteConflict::PullRequestMissing => AssignmentError::NotFound(id.clone()),
                WriteConflict::PullRequestMerged => AssignmentError::PrMerged(id.clone()),
                WriteConflict::ReviewerNotAssigned => AssignmentError::NotAssigned {
                    pull_request: id.clone(),
                    reviewer: old.clone(),
                },
                // The chosen teammate was taken by a concurrent reassignment
                WriteConflict::ReplacementAlreadyAssigned => AssignmentError::NoCandidate(id.clone()),
            }
        }
        other => {
            error!(
                "Failed to swap reviewer {} on pull request {}: {}",
                old, id, other
            );
            AssignmentError::StorageFailure(other)
        }
    }
}
