//! Error types for the assignment engine and its storage contracts.

use thiserror::Error;

use crate::model::{PullRequestId, UserId};

/// A precondition that a store found violated while committing a write.
///
/// The engine checks these before writing, but a concurrent request can
/// invalidate them between the check and the commit. Stores re-validate
/// inside the write transaction and report the failure with this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConflict {
    /// The pull request no longer exists.
    PullRequestMissing,
    /// The pull request was merged before the write committed.
    PullRequestMerged,
    /// The reviewer being replaced is no longer assigned.
    ReviewerNotAssigned,
    /// The chosen replacement was assigned by someone else in the meantime.
    ReplacementAlreadyAssigned,
}

impl std::fmt::Display for WriteConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PullRequestMissing => write!(f, "pull request no longer exists"),
            Self::PullRequestMerged => write!(f, "pull request was merged"),
            Self::ReviewerNotAssigned => write!(f, "reviewer is no longer assigned"),
            Self::ReplacementAlreadyAssigned => {
                write!(f, "replacement reviewer was assigned concurrently")
            }
        }
    }
}

/// Errors returned by repository implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend failed (I/O, SQL error, poisoned lock, ...).
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Persisted data could not be decoded.
    #[error("corrupt data: {what}")]
    Corruption { what: String },

    /// A row with the same key already exists.
    #[error("{entity} '{id}' already exists")]
    Duplicate { entity: &'static str, id: String },

    /// A write precondition no longer held at commit time.
    #[error("write conflict: {0}")]
    Conflict(WriteConflict),
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }

    pub fn duplicate(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            id: id.into(),
        }
    }
}

/// Stable, machine-readable classification of an [`AssignmentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    AuthorNotFound,
    UserNotFound,
    PrMerged,
    NotAssigned,
    NoCandidate,
    StorageFailure,
}

impl ErrorKind {
    /// Error code reported to API clients.
    ///
    /// The three "unknown id" kinds share `NOT_FOUND`; callers that need to
    /// tell them apart match on the kind itself.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists => "PR_EXISTS",
            Self::NotFound | Self::AuthorNotFound | Self::UserNotFound => "NOT_FOUND",
            Self::PrMerged => "PR_MERGED",
            Self::NotAssigned => "NOT_ASSIGNED",
            Self::NoCandidate => "NO_CANDIDATE",
            Self::StorageFailure => "INTERNAL_ERROR",
        }
    }
}

/// Errors returned by the reviewer assignment engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("pull request '{0}' already exists")]
    AlreadyExists(PullRequestId),

    #[error("pull request '{0}' not found")]
    NotFound(PullRequestId),

    #[error("author '{0}' not found")]
    AuthorNotFound(UserId),

    #[error("user '{0}' not found")]
    UserNotFound(UserId),

    #[error("cannot reassign on merged pull request '{0}'")]
    PrMerged(PullRequestId),

    #[error("reviewer '{reviewer}' is not assigned to pull request '{pull_request}'")]
    NotAssigned {
        pull_request: PullRequestId,
        reviewer: UserId,
    },

    #[error("no active replacement candidate in team for pull request '{0}'")]
    NoCandidate(PullRequestId),

    #[error(transparent)]
    StorageFailure(#[from] RepositoryError),
}

impl AssignmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AuthorNotFound(_) => ErrorKind::AuthorNotFound,
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::PrMerged(_) => ErrorKind::PrMerged,
            Self::NotAssigned { .. } => ErrorKind::NotAssigned,
            Self::NoCandidate(_) => ErrorKind::NoCandidate,
            Self::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// Errors returned by team and user administration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("team '{0}' already exists")]
    TeamExists(String),

    #[error("team '{0}' not found")]
    TeamNotFound(String),

    #[error("user '{0}' not found")]
    UserNotFound(UserId),

    #[error(transparent)]
    StorageFailure(#[from] RepositoryError),
}

impl DirectoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TeamExists(_) => "TEAM_EXISTS",
            Self::TeamNotFound(_) | Self::UserNotFound(_) => "NOT_FOUND",
            Self::StorageFailure(_) => "INTERNAL_ERROR",
        }
    }
}
