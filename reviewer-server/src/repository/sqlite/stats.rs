use rusqlite::params;

use reviewer_core::{PullRequestStats, RepositoryError, ReviewerStat, UserId};

use super::{i64_to_count, storage_err, SqliteRepository};

impl SqliteRepository {
    pub(super) async fn reviewer_stats_impl(&self) -> Result<Vec<ReviewerStat>, RepositoryError> {
        self.with_conn("reviewer_stats", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT u.user_id, u.username, COUNT(r.id) AS assigned_count
                     FROM users u
                     LEFT JOIN pull_request_reviewers r ON r.reviewer_id = u.user_id
                     GROUP BY u.user_id, u.username
                     ORDER BY assigned_count DESC, u.user_id",
                )
                .map_err(storage_err("reviewer_stats"))?;

            let rows = stmt
                .query_map(params![], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(storage_err("reviewer_stats"))?;

            let mut stats = Vec::new();
            for row in rows {
                let (user_id, username, count) = row.map_err(storage_err("reviewer_stats row"))?;
                stats.push(ReviewerStat {
                    user_id: UserId::from(user_id),
                    username,
                    assigned_count: i64_to_count(count, "assignment")?,
                });
            }
            Ok(stats)
        })
        .await
    }

    pub(super) async fn pull_request_stats_impl(
        &self,
    ) -> Result<PullRequestStats, RepositoryError> {
        self.with_conn("pull_request_stats", |conn| {
            let (total, open, merged): (i64, i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(status = 'OPEN'), 0),
                            COALESCE(SUM(status = 'MERGED'), 0)
                     FROM pull_requests",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(storage_err("pull_request_stats"))?;

            Ok(PullRequestStats {
                total_prs: i64_to_count(total, "pull request")?,
                open_prs: i64_to_count(open, "open pull request")?,
                merged_prs: i64_to_count(merged, "merged pull request")?,
            })
        })
        .await
    }
}
