//! JSON error responses.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use reviewer_core::{AssignmentError, DirectoryError, ErrorKind};

pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// An error ready to be rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_REQUEST, message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_ERROR,
            INTERNAL_MESSAGE,
        )
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound | ErrorKind::AuthorNotFound | ErrorKind::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorKind::AlreadyExists
            | ErrorKind::PrMerged
            | ErrorKind::NotAssigned
            | ErrorKind::NoCandidate => StatusCode::CONFLICT,
            ErrorKind::StorageFailure => {
                error!("Storage failure: {}", err);
                return Self::internal();
            }
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        let status = match &err {
            DirectoryError::TeamExists(_) => StatusCode::BAD_REQUEST,
            DirectoryError::TeamNotFound(_) | DirectoryError::UserNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DirectoryError::StorageFailure(_) => {
                error!("Storage failure: {}", err);
                return Self::internal();
            }
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewer_core::{PullRequestId, RepositoryError, UserId};

    #[test]
    fn test_assignment_error_statuses() {
        let pr = PullRequestId::from("pr-1");
        let cases = [
            (AssignmentError::AlreadyExists(pr.clone()), StatusCode::CONFLICT, "PR_EXISTS"),
            (AssignmentError::NotFound(pr.clone()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AssignmentError::AuthorNotFound(UserId::from("u1")),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (AssignmentError::PrMerged(pr.clone()), StatusCode::CONFLICT, "PR_MERGED"),
            (
                AssignmentError::NotAssigned {
                    pull_request: pr.clone(),
                    reviewer: UserId::from("u1"),
                },
                StatusCode::CONFLICT,
                "NOT_ASSIGNED",
            ),
            (AssignmentError::NoCandidate(pr), StatusCode::CONFLICT, "NO_CANDIDATE"),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_storage_failure_hides_details() {
        let err = AssignmentError::StorageFailure(RepositoryError::storage(
            "create_pull_request",
            "disk I/O error at /var/lib/secret.db",
        ));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, INTERNAL_ERROR);
        assert!(!api.message.contains("secret"));
    }

    #[test]
    fn test_directory_error_statuses() {
        let exists = ApiError::from(DirectoryError::TeamExists("backend".to_string()));
        assert_eq!(exists.status, StatusCode::BAD_REQUEST);
        assert_eq!(exists.code, "TEAM_EXISTS");

        let missing = ApiError::from(DirectoryError::TeamNotFound("backend".to_string()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.code, "NOT_FOUND");
    }
}
