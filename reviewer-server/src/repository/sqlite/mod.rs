//! SQLite implementation of the storage contracts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Timestamps
//!
//! All timestamps are stored as Unix milliseconds in `INTEGER` columns.

mod directory;
mod pull_requests;
mod stats;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::warn;

use reviewer_core::{
    Directory, DirectoryAdmin, HealthProbe, PullRequest, PullRequestId, PullRequestStats,
    PullRequestStore, PullRequestSummary, RepositoryError, ReviewerStat, Statistics, Team, User,
    UserId,
};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

/// SQLite-backed repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime. The single connection is shared behind
/// a mutex, so every operation (and every transaction) is serialized.
pub struct SqliteRepository {
    /// Exposed as `pub(crate)` so tests can inspect and corrupt rows directly.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` so committed writes survive power loss
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    /// - `foreign_keys = ON` so reviewer and author rows must reference users
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Team membership is not secret, but there is no reason for other
        // local users to write to it either.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite silently keeps DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     This can happen on filesystems that don't support shared memory \
                     (e.g., some network filesystems).",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty (fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS teams (
                    team_name TEXT PRIMARY KEY,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    username TEXT NOT NULL,
                    team_name TEXT NOT NULL REFERENCES teams(team_name),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pull_requests (
                    pull_request_id TEXT PRIMARY KEY,
                    pull_request_name TEXT NOT NULL,
                    author_id TEXT NOT NULL REFERENCES users(user_id),
                    status TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'MERGED')),
                    created_at INTEGER NOT NULL,
                    merged_at INTEGER
                );

                CREATE TABLE IF NOT EXISTS pull_request_reviewers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pull_request_id TEXT NOT NULL REFERENCES pull_requests(pull_request_id),
                    reviewer_id TEXT NOT NULL REFERENCES users(user_id),
                    assigned_at INTEGER NOT NULL,
                    UNIQUE (pull_request_id, reviewer_id)
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Migration from version 1 to version 2: indexes for the team and
        // by-reviewer lookups, which otherwise scan.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_users_team
                    ON users(team_name, is_active);
                CREATE INDEX IF NOT EXISTS idx_reviewers_reviewer
                    ON pull_request_reviewers(reviewer_id);
                CREATE INDEX IF NOT EXISTS idx_pull_requests_created
                    ON pull_requests(created_at DESC);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

pub(super) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp.
pub(super) fn from_millis(value: i64, what: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| RepositoryError::corruption(format!("{} timestamp {}", what, value)))
}

/// Convert a SQLite `COUNT` to an unsigned count.
pub(super) fn i64_to_count(value: i64, what: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::corruption(format!("negative {} count {}", what, value)))
}

/// Whether the error is a PRIMARY KEY or UNIQUE constraint violation.
pub(super) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

pub(super) fn storage_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| RepositoryError::storage(operation, e.to_string())
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl Directory for SqliteRepository {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.get_user_impl(id).await
    }

    async fn active_teammates(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError> {
        self.active_teammates_impl(team_name, exclude).await
    }
}

#[async_trait]
impl PullRequestStore for SqliteRepository {
    async fn pull_request_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
        self.pull_request_exists_impl(id).await
    }

    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        self.create_pull_request_impl(pr).await
    }

    async fn get_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError> {
        self.get_pull_request_impl(id).await
    }

    async fn set_merged(
        &self,
        id: &PullRequestId,
        merged_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.set_merged_impl(id, merged_at).await
    }

    async fn swap_reviewer(
        &self,
        id: &PullRequestId,
        old: &UserId,
        new: &UserId,
    ) -> Result<(), RepositoryError> {
        self.swap_reviewer_impl(id, old, new).await
    }

    async fn pull_requests_by_reviewer(
        &self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequestSummary>, RepositoryError> {
        self.pull_requests_by_reviewer_impl(reviewer).await
    }
}

#[async_trait]
impl DirectoryAdmin for SqliteRepository {
    async fn team_exists(&self, team_name: &str) -> Result<bool, RepositoryError> {
        self.team_exists_impl(team_name).await
    }

    async fn create_team(&self, team: &Team) -> Result<(), RepositoryError> {
        self.create_team_impl(team).await
    }

    async fn get_team(&self, team_name: &str) -> Result<Option<Team>, RepositoryError> {
        self.get_team_impl(team_name).await
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError> {
        self.set_user_active_impl(id, is_active).await
    }

    async fn deactivate_team(&self, team_name: &str) -> Result<bool, RepositoryError> {
        self.deactivate_team_impl(team_name).await
    }
}

#[async_trait]
impl Statistics for SqliteRepository {
    async fn reviewer_stats(&self) -> Result<Vec<ReviewerStat>, RepositoryError> {
        self.reviewer_stats_impl().await
    }

    async fn pull_request_stats(&self) -> Result<PullRequestStats, RepositoryError> {
        self.pull_request_stats_impl().await
    }
}

#[async_trait]
impl HealthProbe for SqliteRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        self.with_conn("ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(storage_err("ping"))
        })
        .await
    }
}
