//! In-memory implementation of the storage contracts.
//!
//! All tables live behind a single `RwLock`, so every mutating method holds
//! the write lock for its whole check-then-write sequence. That gives the
//! same atomicity as a database transaction. All state is lost on restart.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Directory, DirectoryAdmin, HealthProbe, PullRequestStore, Statistics};
use crate::error::{RepositoryError, WriteConflict};
use crate::lifecycle;
use crate::model::{
    PullRequest, PullRequestId, PullRequestStats, PullRequestStatus, PullRequestSummary,
    ReviewerStat, Team, TeamMember, User, UserId,
};

/// A stored pull request plus its insertion sequence, used to order
/// pull requests created within the same instant.
#[derive(Debug, Clone)]
struct StoredPullRequest {
    pr: PullRequest,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    teams: BTreeSet<String>,
    users: HashMap<UserId, User>,
    pull_requests: HashMap<PullRequestId, StoredPullRequest>,
    next_seq: u64,
}

impl Tables {
    fn team_known(&self, team_name: &str) -> bool {
        self.teams.contains(team_name) || self.users.values().any(|u| u.team_name == team_name)
    }
}

/// In-memory repository.
///
/// Useful for tests and for running the service without a database file.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Directory for InMemoryRepository {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(id).cloned())
    }

    async fn active_teammates(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.team_name == team_name && u.is_active && &u.id != exclude)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}

#[async_trait]
impl PullRequestStore for InMemoryRepository {
    async fn pull_request_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.pull_requests.contains_key(id))
    }

    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;

        if tables.pull_requests.contains_key(&pr.id) {
            return Err(RepositoryError::duplicate("pull request", pr.id.as_str()));
        }

        // Mirror the foreign keys and unique constraint of the SQL schema
        if !tables.users.contains_key(&pr.author_id) {
            return Err(RepositoryError::storage(
                "create_pull_request",
                format!("unknown author '{}'", pr.author_id),
            ));
        }
        for (i, reviewer) in pr.reviewers.iter().enumerate() {
            if !tables.users.contains_key(reviewer) {
                return Err(RepositoryError::storage(
                    "create_pull_request",
                    format!("unknown reviewer '{}'", reviewer),
                ));
            }
            if pr.reviewers[..i].contains(reviewer) {
                return Err(RepositoryError::storage(
                    "create_pull_request",
                    format!("reviewer '{}' listed twice", reviewer),
                ));
            }
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.pull_requests.insert(
            pr.id.clone(),
            StoredPullRequest {
                pr: pr.clone(),
                seq,
            },
        );
        Ok(())
    }

    async fn get_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.pull_requests.get(id).map(|stored| stored.pr.clone()))
    }

    async fn set_merged(
        &self,
        id: &PullRequestId,
        merged_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(stored) = tables.pull_requests.get_mut(id) {
            lifecycle::apply_merge(&mut stored.pr, merged_at);
        }
        Ok(())
    }

    async fn swap_reviewer(
        &self,
        id: &PullRequestId,
        old: &UserId,
        new: &UserId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .pull_requests
            .get_mut(id)
            .ok_or(RepositoryError::Conflict(WriteConflict::PullRequestMissing))?;
        let pr = &mut stored.pr;

        if pr.status == PullRequestStatus::Merged {
            return Err(RepositoryError::Conflict(WriteConflict::PullRequestMerged));
        }
        let Some(position) = pr.reviewers.iter().position(|r| r == old) else {
            return Err(RepositoryError::Conflict(
                WriteConflict::ReviewerNotAssigned,
            ));
        };
        if pr.has_reviewer(new) {
            return Err(RepositoryError::Conflict(
                WriteConflict::ReplacementAlreadyAssigned,
            ));
        }

        pr.reviewers.remove(position);
        pr.reviewers.push(new.clone());
        Ok(())
    }

    async fn pull_requests_by_reviewer(
        &self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequestSummary>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&StoredPullRequest> = tables
            .pull_requests
            .values()
            .filter(|stored| stored.pr.has_reviewer(reviewer))
            .collect();
        matching.sort_by(|a, b| {
            b.pr.created_at
                .cmp(&a.pr.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        Ok(matching.into_iter().map(|s| s.pr.summary()).collect())
    }
}

#[async_trait]
impl DirectoryAdmin for InMemoryRepository {
    async fn team_exists(&self, team_name: &str) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.teams.contains(team_name))
    }

    async fn create_team(&self, team: &Team) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.teams.contains(&team.team_name) {
            return Err(RepositoryError::duplicate("team", team.team_name.as_str()));
        }

        tables.teams.insert(team.team_name.clone());
        for user in team.users() {
            tables.users.insert(user.id.clone(), user);
        }
        Ok(())
    }

    async fn get_team(&self, team_name: &str) -> Result<Option<Team>, RepositoryError> {
        let tables = self.tables.read().await;
        if !tables.team_known(team_name) {
            return Ok(None);
        }

        let mut members: Vec<TeamMember> = tables
            .users
            .values()
            .filter(|u| u.team_name == team_name)
            .map(|u| TeamMember {
                user_id: u.id.clone(),
                username: u.username.clone(),
                is_active: u.is_active,
            })
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));

        Ok(Some(Team {
            team_name: team_name.to_string(),
            members,
        }))
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    async fn deactivate_team(&self, team_name: &str) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.team_known(team_name) {
            return Ok(false);
        }
        for user in tables.users.values_mut() {
            if user.team_name == team_name {
                user.is_active = false;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Statistics for InMemoryRepository {
    async fn reviewer_stats(&self) -> Result<Vec<ReviewerStat>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut stats: Vec<ReviewerStat> = tables
            .users
            .values()
            .map(|u| ReviewerStat {
                user_id: u.id.clone(),
                username: u.username.clone(),
                assigned_count: tables
                    .pull_requests
                    .values()
                    .filter(|stored| stored.pr.has_reviewer(&u.id))
                    .count() as u64,
            })
            .collect();
        stats.sort_by(|a, b| {
            b.assigned_count
                .cmp(&a.assigned_count)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(stats)
    }

    async fn pull_request_stats(&self) -> Result<PullRequestStats, RepositoryError> {
        let tables = self.tables.read().await;
        let mut stats = PullRequestStats::default();
        for stored in tables.pull_requests.values() {
            stats.total_prs += 1;
            match stored.pr.status {
                PullRequestStatus::Open => stats.open_prs += 1,
                PullRequestStatus::Merged => stats.merged_prs += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl HealthProbe for InMemoryRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
