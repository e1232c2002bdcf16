//! Pull request and reviewer rows.
//!
//! Reviewers live in `pull_request_reviewers`; their autoincrement `id` is the
//! assignment order, so a replacement reviewer always sorts last.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use reviewer_core::{
    PullRequest, PullRequestId, PullRequestStatus, PullRequestSummary, RepositoryError, UserId,
    WriteConflict,
};

use super::{from_millis, is_unique_violation, storage_err, to_millis, SqliteRepository};

fn parse_status(raw: &str) -> Result<PullRequestStatus, RepositoryError> {
    PullRequestStatus::parse(raw)
        .ok_or_else(|| RepositoryError::corruption(format!("pull request status '{}'", raw)))
}

pub(super) fn load_pull_request_sync(
    conn: &Connection,
    id: &str,
) -> Result<Option<PullRequest>, RepositoryError> {
    let row: Option<(String, String, String, i64, Option<i64>)> = conn
        .query_row(
            "SELECT pull_request_name, author_id, status, created_at, merged_at
             FROM pull_requests WHERE pull_request_id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()
        .map_err(storage_err("get_pull_request"))?;

    let Some((name, author_id, status, created_at, merged_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT reviewer_id FROM pull_request_reviewers
             WHERE pull_request_id = ?1 ORDER BY id",
        )
        .map_err(storage_err("get_pull_request reviewers"))?;
    let reviewers = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))
        .map_err(storage_err("get_pull_request reviewers"))?
        .map(|r| r.map(UserId::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err("get_pull_request reviewers"))?;

    Ok(Some(PullRequest {
        id: PullRequestId::from(id),
        name,
        author_id: UserId::from(author_id),
        status: parse_status(&status)?,
        reviewers,
        created_at: Some(from_millis(created_at, "created_at")?),
        merged_at: merged_at
            .map(|ms| from_millis(ms, "merged_at"))
            .transpose()?,
    }))
}

fn insert_pull_request_sync(conn: &mut Connection, pr: &PullRequest) -> Result<(), RepositoryError> {
    let created_at = to_millis(pr.created_at.unwrap_or_else(Utc::now));
    let tx = conn
        .transaction()
        .map_err(storage_err("create_pull_request begin"))?;

    tx.execute(
        "INSERT INTO pull_requests
             (pull_request_id, pull_request_name, author_id, status, created_at, merged_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            pr.id.as_str(),
            pr.name,
            pr.author_id.as_str(),
            pr.status.as_str(),
            created_at,
            pr.merged_at.map(to_millis),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            RepositoryError::duplicate("pull request", pr.id.as_str())
        } else {
            RepositoryError::storage("create_pull_request", e.to_string())
        }
    })?;

    for reviewer in &pr.reviewers {
        tx.execute(
            "INSERT INTO pull_request_reviewers (pull_request_id, reviewer_id, assigned_at)
             VALUES (?1, ?2, ?3)",
            params![pr.id.as_str(), reviewer.as_str(), created_at],
        )
        .map_err(storage_err("create_pull_request reviewer"))?;
    }

    tx.commit().map_err(storage_err("create_pull_request commit"))
}

fn swap_reviewer_sync(
    conn: &mut Connection,
    id: &str,
    old: &str,
    new: &str,
    assigned_at: i64,
) -> Result<(), RepositoryError> {
    // Take the write lock up front so the checks below and the writes see
    // the same snapshot.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(storage_err("swap_reviewer begin"))?;

    let status: Option<String> = tx
        .query_row(
            "SELECT status FROM pull_requests WHERE pull_request_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err("swap_reviewer status"))?;

    match status.as_deref().map(parse_status).transpose()? {
        None => return Err(RepositoryError::Conflict(WriteConflict::PullRequestMissing)),
        Some(PullRequestStatus::Merged) => {
            return Err(RepositoryError::Conflict(WriteConflict::PullRequestMerged))
        }
        Some(PullRequestStatus::Open) => {}
    }

    let is_assigned = |reviewer: &str| -> Result<bool, RepositoryError> {
        tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM pull_request_reviewers
                           WHERE pull_request_id = ?1 AND reviewer_id = ?2)",
            params![id, reviewer],
            |row| row.get(0),
        )
        .map_err(storage_err("swap_reviewer lookup"))
    };
    if !is_assigned(old)? {
        return Err(RepositoryError::Conflict(WriteConflict::ReviewerNotAssigned));
    }
    if is_assigned(new)? {
        return Err(RepositoryError::Conflict(
            WriteConflict::ReplacementAlreadyAssigned,
        ));
    }

    tx.execute(
        "DELETE FROM pull_request_reviewers WHERE pull_request_id = ?1 AND reviewer_id = ?2",
        params![id, old],
    )
    .map_err(storage_err("swap_reviewer delete"))?;
    tx.execute(
        "INSERT INTO pull_request_reviewers (pull_request_id, reviewer_id, assigned_at)
         VALUES (?1, ?2, ?3)",
        params![id, new, assigned_at],
    )
    .map_err(storage_err("swap_reviewer insert"))?;

    tx.commit().map_err(storage_err("swap_reviewer commit"))
}

// =============================================================================
// Async implementations
// =============================================================================

impl SqliteRepository {
    pub(super) async fn pull_request_exists_impl(
        &self,
        id: &PullRequestId,
    ) -> Result<bool, RepositoryError> {
        let id = id.to_string();
        self.with_conn("pull_request_exists", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM pull_requests WHERE pull_request_id = ?1)",
                params![id],
                |row| row.get(0),
            )
            .map_err(storage_err("pull_request_exists"))
        })
        .await
    }

    pub(super) async fn create_pull_request_impl(
        &self,
        pr: &PullRequest,
    ) -> Result<(), RepositoryError> {
        let pr = pr.clone();
        self.with_conn("create_pull_request", move |conn| {
            insert_pull_request_sync(conn, &pr)
        })
        .await
    }

    pub(super) async fn get_pull_request_impl(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError> {
        let id = id.to_string();
        self.with_conn("get_pull_request", move |conn| {
            load_pull_request_sync(conn, &id)
        })
        .await
    }

    pub(super) async fn set_merged_impl(
        &self,
        id: &PullRequestId,
        merged_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let id = id.to_string();
        let merged_at = to_millis(merged_at);
        self.with_conn("set_merged", move |conn| {
            // Conditional so a concurrent second merge keeps the first timestamp
            conn.execute(
                "UPDATE pull_requests SET status = 'MERGED', merged_at = ?2
                 WHERE pull_request_id = ?1 AND status != 'MERGED'",
                params![id, merged_at],
            )
            .map(|_| ())
            .map_err(storage_err("set_merged"))
        })
        .await
    }

    pub(super) async fn swap_reviewer_impl(
        &self,
        id: &PullRequestId,
        old: &UserId,
        new: &UserId,
    ) -> Result<(), RepositoryError> {
        let id = id.to_string();
        let old = old.to_string();
        let new = new.to_string();
        let assigned_at = to_millis(Utc::now());
        self.with_conn("swap_reviewer", move |conn| {
            swap_reviewer_sync(conn, &id, &old, &new, assigned_at)
        })
        .await
    }

    pub(super) async fn pull_requests_by_reviewer_impl(
        &self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequestSummary>, RepositoryError> {
        let reviewer = reviewer.to_string();
        self.with_conn("pull_requests_by_reviewer", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT p.pull_request_id, p.pull_request_name, p.author_id, p.status
                     FROM pull_requests p
                     JOIN pull_request_reviewers r ON r.pull_request_id = p.pull_request_id
                     WHERE r.reviewer_id = ?1
                     ORDER BY p.created_at DESC, p.rowid DESC",
                )
                .map_err(storage_err("pull_requests_by_reviewer"))?;

            let rows = stmt
                .query_map(params![reviewer], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(storage_err("pull_requests_by_reviewer"))?;

            let mut summaries = Vec::new();
            for row in rows {
                let (id, name, author_id, status) =
                    row.map_err(storage_err("pull_requests_by_reviewer row"))?;
                summaries.push(PullRequestSummary {
                    id: PullRequestId::from(id),
                    name,
                    author_id: UserId::from(author_id),
                    status: parse_status(&status)?,
                });
            }
            Ok(summaries)
        })
        .await
    }
}
