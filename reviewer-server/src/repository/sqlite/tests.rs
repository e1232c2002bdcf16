//! Tests for SQLite repository implementation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::params;

use reviewer_core::{
    Directory, DirectoryAdmin, EngineConfig, HealthProbe, InMemoryRepository, PullRequest,
    PullRequestId, PullRequestStatus, PullRequestStore, RepositoryError, ReviewerAssignmentEngine,
    Statistics, Team, TeamMember, UserId, WriteConflict,
};

use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};

use proptest::prelude::*;

fn member(id: &str, username: &str, active: bool) -> TeamMember {
    TeamMember {
        user_id: UserId::from(id),
        username: username.to_string(),
        is_active: active,
    }
}

fn backend_team() -> Team {
    Team {
        team_name: "backend".to_string(),
        members: vec![
            member("u1", "Alice", true),
            member("u2", "Bob", true),
            member("u3", "Carol", true),
            member("u4", "Dave", false),
        ],
    }
}

async fn seeded_repo() -> SqliteRepository {
    let repo = SqliteRepository::new_in_memory().unwrap();
    repo.create_team(&backend_team()).await.unwrap();
    repo
}

fn open_pr(id: &str, reviewers: &[&str]) -> PullRequest {
    PullRequest::open(
        id,
        format!("PR {}", id),
        "u1",
        reviewers.iter().map(|r| UserId::from(*r)).collect(),
        Utc::now(),
    )
}

fn ids(raw: &[&str]) -> Vec<UserId> {
    raw.iter().map(|s| UserId::from(*s)).collect()
}

// =============================================================================
// Schema
// =============================================================================

#[tokio::test]
async fn test_fresh_database_records_schema_version() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let conn = repo.conn.lock().unwrap();
    let version: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_foreign_keys_enabled() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let conn = repo.conn.lock().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("reviewers.db");

    {
        let repo = SqliteRepository::new(&path).unwrap();
        repo.create_team(&backend_team()).await.unwrap();
        repo.create_pull_request(&open_pr("pr-1", &["u2", "u3"]))
            .await
            .unwrap();
    }

    let repo = SqliteRepository::new(&path).unwrap();
    let pr = repo
        .get_pull_request(&PullRequestId::from("pr-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pr.reviewers, ids(&["u2", "u3"]));
    assert!(repo.team_exists("backend").await.unwrap());
}

#[cfg(unix)]
#[tokio::test]
async fn test_database_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviewers.db");
    let _repo = SqliteRepository::new(&path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviewers.db");

    {
        let repo = SqliteRepository::new(&path).unwrap();
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    match SqliteRepository::new(&path) {
        Err(RepositoryError::Storage { operation, .. }) => assert_eq!(operation, "schema version"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("newer schema should be rejected"),
    }
}

#[tokio::test]
async fn test_ping() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    repo.ping().await.unwrap();
}

// =============================================================================
// Pull requests
// =============================================================================

#[tokio::test]
async fn test_get_returns_none_for_missing() {
    let repo = seeded_repo().await;
    let id = PullRequestId::from("missing");
    assert!(repo.get_pull_request(&id).await.unwrap().is_none());
    assert!(!repo.pull_request_exists(&id).await.unwrap());
}

#[tokio::test]
async fn test_create_then_get() {
    let repo = seeded_repo().await;
    let pr = open_pr("pr-1", &["u3", "u2"]);
    repo.create_pull_request(&pr).await.unwrap();

    let stored = repo.get_pull_request(&pr.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "PR pr-1");
    assert_eq!(stored.author_id, UserId::from("u1"));
    assert_eq!(stored.status, PullRequestStatus::Open);
    // Assignment order, not lexical order
    assert_eq!(stored.reviewers, ids(&["u3", "u2"]));
    assert_eq!(
        stored.created_at.map(|t| t.timestamp_millis()),
        pr.created_at.map(|t| t.timestamp_millis())
    );
    assert!(stored.merged_at.is_none());
    assert!(repo.pull_request_exists(&pr.id).await.unwrap());
}

#[tokio::test]
async fn test_create_duplicate_id() {
    let repo = seeded_repo().await;
    repo.create_pull_request(&open_pr("pr-1", &["u2"]))
        .await
        .unwrap();

    let err = repo
        .create_pull_request(&open_pr("pr-1", &["u3"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Duplicate { entity: "pull request", .. }));

    // The original is untouched
    let stored = repo
        .get_pull_request(&PullRequestId::from("pr-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.reviewers, ids(&["u2"]));
}

#[tokio::test]
async fn test_create_with_unknown_reviewer_rolls_back() {
    let repo = seeded_repo().await;
    let err = repo
        .create_pull_request(&open_pr("pr-1", &["u2", "ghost"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Storage { .. }));

    // No half-written pull request
    assert!(!repo
        .pull_request_exists(&PullRequestId::from("pr-1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_set_merged_keeps_first_timestamp() {
    let repo = seeded_repo().await;
    let pr = open_pr("pr-1", &["u2"]);
    repo.create_pull_request(&pr).await.unwrap();

    let first = Utc::now();
    repo.set_merged(&pr.id, first).await.unwrap();
    repo.set_merged(&pr.id, first + Duration::minutes(5))
        .await
        .unwrap();

    let stored = repo.get_pull_request(&pr.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PullRequestStatus::Merged);
    assert_eq!(
        stored.merged_at.map(|t| t.timestamp_millis()),
        Some(first.timestamp_millis())
    );
    assert_eq!(stored.reviewers, ids(&["u2"]));
}

#[tokio::test]
async fn test_swap_appends_replacement() {
    let repo = seeded_repo().await;
    let pr = open_pr("pr-1", &["u2", "u3"]);
    repo.create_pull_request(&pr).await.unwrap();

    repo.swap_reviewer(&pr.id, &UserId::from("u2"), &UserId::from("u4"))
        .await
        .unwrap();

    let stored = repo.get_pull_request(&pr.id).await.unwrap().unwrap();
    assert_eq!(stored.reviewers, ids(&["u3", "u4"]));
}

#[tokio::test]
async fn test_swap_conflicts() {
    let repo = seeded_repo().await;
    let pr = open_pr("pr-1", &["u2", "u3"]);
    repo.create_pull_request(&pr).await.unwrap();

    let conflict = |r: Result<(), RepositoryError>| match r {
        Err(RepositoryError::Conflict(c)) => c,
        other => panic!("expected conflict, got {:?}", other),
    };

    let missing = repo
        .swap_reviewer(
            &PullRequestId::from("nope"),
            &UserId::from("u2"),
            &UserId::from("u4"),
        )
        .await;
    assert_eq!(conflict(missing), WriteConflict::PullRequestMissing);

    let not_assigned = repo
        .swap_reviewer(&pr.id, &UserId::from("u4"), &UserId::from("u1"))
        .await;
    assert_eq!(conflict(not_assigned), WriteConflict::ReviewerNotAssigned);

    let taken = repo
        .swap_reviewer(&pr.id, &UserId::from("u2"), &UserId::from("u3"))
        .await;
    assert_eq!(conflict(taken), WriteConflict::ReplacementAlreadyAssigned);

    // Failed swaps leave the reviewer set alone
    let stored = repo.get_pull_request(&pr.id).await.unwrap().unwrap();
    assert_eq!(stored.reviewers, ids(&["u2", "u3"]));

    repo.set_merged(&pr.id, Utc::now()).await.unwrap();
    let merged = repo
        .swap_reviewer(&pr.id, &UserId::from("u2"), &UserId::from("u4"))
        .await;
    assert_eq!(conflict(merged), WriteConflict::PullRequestMerged);
}

#[tokio::test]
async fn test_by_reviewer_newest_first() {
    let repo = seeded_repo().await;
    let base = Utc::now();
    for (i, id) in ["pr-1", "pr-2", "pr-3"].into_iter().enumerate() {
        let mut pr = open_pr(id, &["u2"]);
        pr.created_at = Some(base + Duration::seconds(i as i64));
        repo.create_pull_request(&pr).await.unwrap();
    }
    // Same instant as pr-3; inserted later so it sorts first
    let mut tie = open_pr("pr-0", &["u2"]);
    tie.created_at = Some(base + Duration::seconds(2));
    repo.create_pull_request(&tie).await.unwrap();

    repo.set_merged(&PullRequestId::from("pr-1"), Utc::now())
        .await
        .unwrap();

    let listed = repo
        .pull_requests_by_reviewer(&UserId::from("u2"))
        .await
        .unwrap();
    let order: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(order, vec!["pr-0", "pr-3", "pr-2", "pr-1"]);
    assert_eq!(listed[3].status, PullRequestStatus::Merged);

    assert!(repo
        .pull_requests_by_reviewer(&UserId::from("u3"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_corrupt_status_is_reported() {
    let repo = seeded_repo().await;
    repo.create_pull_request(&open_pr("pr-1", &["u2"]))
        .await
        .unwrap();

    {
        // Bypass the CHECK constraint the way a hand edit of the file would
        let conn = repo.conn.lock().unwrap();
        conn.execute_batch(
            "PRAGMA ignore_check_constraints = ON;
             UPDATE pull_requests SET status = 'CLOSED' WHERE pull_request_id = 'pr-1';
             PRAGMA ignore_check_constraints = OFF;",
        )
        .unwrap();
    }

    let err = repo
        .get_pull_request(&PullRequestId::from("pr-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Corruption { .. }));
}

// =============================================================================
// Teams and users
// =============================================================================

#[tokio::test]
async fn test_active_teammates_ordered_and_filtered() {
    let repo = seeded_repo().await;
    let mates = repo
        .active_teammates("backend", &UserId::from("u2"))
        .await
        .unwrap();
    let mate_ids: Vec<&str> = mates.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(mate_ids, vec!["u1", "u3"]);
}

#[tokio::test]
async fn test_create_team_twice() {
    let repo = seeded_repo().await;
    let err = repo.create_team(&backend_team()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Duplicate { entity: "team", .. }));
}

#[tokio::test]
async fn test_create_team_upserts_members() {
    let repo = seeded_repo().await;
    repo.create_team(&Team {
        team_name: "payments".to_string(),
        members: vec![member("u2", "Bobby", false), member("p1", "Pat", true)],
    })
    .await
    .unwrap();

    let moved = repo.get_user(&UserId::from("u2")).await.unwrap().unwrap();
    assert_eq!(moved.team_name, "payments");
    assert_eq!(moved.username, "Bobby");
    assert!(!moved.is_active);

    let payments = repo.get_team("payments").await.unwrap().unwrap();
    let names: Vec<&str> = payments.members.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["Bobby", "Pat"]);
}

#[tokio::test]
async fn test_get_team_members_by_username() {
    let repo = seeded_repo().await;
    let team = repo.get_team("backend").await.unwrap().unwrap();
    let names: Vec<&str> = team.members.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob", "Carol", "Dave"]);

    assert!(repo.get_team("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_set_user_active() {
    let repo = seeded_repo().await;
    let user = repo
        .set_user_active(&UserId::from("u4"), true)
        .await
        .unwrap()
        .unwrap();
    assert!(user.is_active);
    assert_eq!(user.team_name, "backend");

    assert!(repo
        .set_user_active(&UserId::from("ghost"), true)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_deactivate_team() {
    let repo = seeded_repo().await;
    assert!(repo.deactivate_team("backend").await.unwrap());
    assert!(repo
        .active_teammates("backend", &UserId::from("nobody"))
        .await
        .unwrap()
        .is_empty());

    assert!(!repo.deactivate_team("nope").await.unwrap());
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn test_statistics() {
    let repo = seeded_repo().await;
    repo.create_pull_request(&open_pr("pr-1", &["u2", "u3"]))
        .await
        .unwrap();
    repo.create_pull_request(&open_pr("pr-2", &["u2"]))
        .await
        .unwrap();
    repo.set_merged(&PullRequestId::from("pr-2"), Utc::now())
        .await
        .unwrap();

    let stats = repo.reviewer_stats().await.unwrap();
    let counts: Vec<(&str, u64)> = stats
        .iter()
        .map(|s| (s.user_id.as_str(), s.assigned_count))
        .collect();
    assert_eq!(counts, vec![("u2", 2), ("u3", 1), ("u1", 0), ("u4", 0)]);

    let pr_stats = repo.pull_request_stats().await.unwrap();
    assert_eq!(pr_stats.total_prs, 2);
    assert_eq!(pr_stats.open_prs, 1);
    assert_eq!(pr_stats.merged_prs, 1);
}

#[tokio::test]
async fn test_empty_statistics() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    assert!(repo.reviewer_stats().await.unwrap().is_empty());
    let pr_stats = repo.pull_request_stats().await.unwrap();
    assert_eq!(pr_stats.total_prs, 0);
    assert_eq!(pr_stats.open_prs, 0);
    assert_eq!(pr_stats.merged_prs, 0);
}

// =============================================================================
// Engine over SQLite
// =============================================================================

#[tokio::test]
async fn test_engine_end_to_end() {
    let repo = Arc::new(seeded_repo().await);
    let engine = ReviewerAssignmentEngine::from_repository(repo.clone(), EngineConfig::default());

    let pr = engine
        .create_pull_request(
            PullRequestId::from("pr-1"),
            "Add search".to_string(),
            UserId::from("u1"),
        )
        .await
        .unwrap();
    let mut reviewers = pr.reviewers.clone();
    reviewers.sort();
    assert_eq!(reviewers, ids(&["u2", "u3"]));

    // u4 is the only other teammate but inactive
    let err = engine
        .reassign_reviewer(pr.id.clone(), UserId::from("u2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_CANDIDATE");

    repo.set_user_active(&UserId::from("u4"), true)
        .await
        .unwrap();
    let outcome = engine
        .reassign_reviewer(pr.id.clone(), UserId::from("u2"))
        .await
        .unwrap();
    assert_eq!(outcome.replaced_by, UserId::from("u4"));
    assert_eq!(outcome.pull_request.reviewers.last(), Some(&UserId::from("u4")));

    let merged = engine.merge_pull_request(pr.id.clone()).await.unwrap();
    let again = engine.merge_pull_request(pr.id.clone()).await.unwrap();
    assert_eq!(merged, again);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_concurrent_reassignments() {
    let repo = Arc::new(SqliteRepository::new_in_memory().unwrap());
    repo.create_team(&Team {
        team_name: "platform".to_string(),
        members: (1..=6)
            .map(|i| member(&format!("p{}", i), &format!("Dev {}", i), true))
            .collect(),
    })
    .await
    .unwrap();
    let engine = Arc::new(ReviewerAssignmentEngine::from_repository(
        repo.clone(),
        EngineConfig::default(),
    ));
    let pr = engine
        .create_pull_request(
            PullRequestId::from("pr-1"),
            "Shard index".to_string(),
            UserId::from("p1"),
        )
        .await
        .unwrap();
    let target = pr.reviewers[0].clone();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let id = pr.id.clone();
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            engine.reassign_reviewer(id, target).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.code(), "NOT_ASSIGNED"),
        }
    }
    assert_eq!(successes, 1);

    let after = repo.get_pull_request(&pr.id).await.unwrap().unwrap();
    assert_eq!(after.reviewers.len(), 2);
    let unique: std::collections::HashSet<&UserId> = after.reviewers.iter().collect();
    assert_eq!(unique.len(), 2);
    assert!(!after.has_reviewer(&target));
    assert!(!after.has_reviewer(&UserId::from("p1")));

    let conn = repo.conn.lock().unwrap();
    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pull_request_reviewers WHERE pull_request_id = ?1",
            params!["pr-1"],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 2);
}

// =============================================================================
// Property tests
// =============================================================================

proptest! {
    /// Property: for any sequence of swaps, SQLite and the in-memory store
    /// agree on every outcome and on the final reviewer order.
    #[test]
    fn swaps_match_in_memory_store(
        swaps in proptest::collection::vec((0usize..5, 0usize..5), 0..20),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let users = ["u1", "u2", "u3", "u4", "u5"];
            let team = Team {
                team_name: "backend".to_string(),
                members: users.iter().map(|u| member(u, u, true)).collect(),
            };

            let sqlite = SqliteRepository::new_in_memory().unwrap();
            let memory = InMemoryRepository::new();
            sqlite.create_team(&team).await.unwrap();
            memory.create_team(&team).await.unwrap();

            let pr = open_pr("pr-1", &["u2", "u3"]);
            sqlite.create_pull_request(&pr).await.unwrap();
            memory.create_pull_request(&pr).await.unwrap();

            for (old, new) in swaps {
                let old = UserId::from(users[old]);
                let new = UserId::from(users[new]);
                let a = sqlite.swap_reviewer(&pr.id, &old, &new).await;
                let b = memory.swap_reviewer(&pr.id, &old, &new).await;
                assert_eq!(a, b, "swap {} -> {}", old, new);
            }

            let a = sqlite.get_pull_request(&pr.id).await.unwrap().unwrap();
            let b = memory.get_pull_request(&pr.id).await.unwrap().unwrap();
            assert_eq!(a.reviewers, b.reviewers);
        });
    }
}
