//! Storage contracts consumed by the engine and the administration layer.
//!
//! The engine only depends on [`Directory`] (read-only user lookups) and
//! [`PullRequestStore`] (pull request persistence). Team administration,
//! statistics and health checks have their own traits so that a backend can
//! be plugged in piecemeal. [`InMemoryRepository`] implements all of them;
//! the server crate provides a SQLite implementation.

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepositoryError;
use crate::model::{
    PullRequest, PullRequestId, PullRequestStats, PullRequestSummary, ReviewerStat, Team, User,
    UserId,
};

/// Read-only view of users and their teams.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a user by id.
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    /// Active members of `team_name`, excluding `exclude`, ordered by user id.
    async fn active_teammates(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError>;
}

/// Durable pull request storage.
///
/// Every mutating method is a single atomic unit: either all of its rows are
/// written or none are.
#[async_trait]
pub trait PullRequestStore: Send + Sync {
    async fn pull_request_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError>;

    /// Insert the pull request and all of its reviewer rows.
    ///
    /// Fails with [`RepositoryError::Duplicate`] if the id is taken.
    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), RepositoryError>;

    /// Fetch a pull request with reviewers in assignment order.
    async fn get_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError>;

    /// Mark the pull request merged. A no-op if it is already merged.
    async fn set_merged(
        &self,
        id: &PullRequestId,
        merged_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Replace `old` with `new` in the reviewer set in one transaction.
    ///
    /// Re-validates inside the transaction that the pull request is still
    /// open, `old` is still assigned and `new` is not, failing with
    /// [`RepositoryError::Conflict`] otherwise. `new` is appended to the end
    /// of the assignment order.
    async fn swap_reviewer(
        &self,
        id: &PullRequestId,
        old: &UserId,
        new: &UserId,
    ) -> Result<(), RepositoryError>;

    /// Pull requests (any status) reviewed by `reviewer`, newest first.
    async fn pull_requests_by_reviewer(
        &self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequestSummary>, RepositoryError>;
}

/// Team and user administration.
#[async_trait]
pub trait DirectoryAdmin: Send + Sync {
    async fn team_exists(&self, team_name: &str) -> Result<bool, RepositoryError>;

    /// Create the team and upsert every member onto it in one transaction.
    ///
    /// Fails with [`RepositoryError::Duplicate`] if the team exists.
    async fn create_team(&self, team: &Team) -> Result<(), RepositoryError>;

    /// Team with members ordered by username, or `None` if unknown.
    async fn get_team(&self, team_name: &str) -> Result<Option<Team>, RepositoryError>;

    /// Set a user's active flag, returning the updated user.
    async fn set_user_active(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError>;

    /// Deactivate every member of the team. Returns `false` if the team is unknown.
    async fn deactivate_team(&self, team_name: &str) -> Result<bool, RepositoryError>;
}

/// Aggregate read-side queries.
#[async_trait]
pub trait Statistics: Send + Sync {
    /// Current assignment count per user, highest first.
    async fn reviewer_stats(&self) -> Result<Vec<ReviewerStat>, RepositoryError>;

    async fn pull_request_stats(&self) -> Result<PullRequestStats, RepositoryError>;
}

/// Liveness probe for the backing store.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// A backend that provides every storage contract.
pub trait Repository:
    Directory + PullRequestStore + DirectoryAdmin + Statistics + HealthProbe
{
}

impl<T> Repository for T where
    T: Directory + PullRequestStore + DirectoryAdmin + Statistics + HealthProbe
{
}
