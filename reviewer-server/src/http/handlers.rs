//! HTTP handlers.
//!
//! Each handler validates its input, calls into the engine or directory
//! service, and wraps the result in the response envelope for its route.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use reviewer_core::{
    PullRequest, PullRequestId, PullRequestStats, PullRequestSummary, ReviewerStat, Team, User,
    UserId,
};

use super::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Reject blank required strings.
fn require(field: &'static str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid_request(format!("{} is required", field)));
    }
    Ok(())
}

// =============================================================================
// Request and response bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TeamNameQuery {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamNameRequest {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetIsActiveRequest {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MergePullRequestRequest {
    pub pull_request_id: PullRequestId,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: PullRequestId,
    pub old_user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserReviewsResponse {
    pub user_id: UserId,
    pub pull_requests: Vec<PullRequestSummary>,
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

#[derive(Debug, Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: UserId,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub user_stats: Vec<ReviewerStat>,
    pub pr_stats: PullRequestStats,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub database: &'static str,
}

// =============================================================================
// Teams and users
// =============================================================================

pub async fn add_team(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Team>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TeamResponse>)> {
    let Json(team) = body?;
    require("team_name", &team.team_name)?;
    for member in &team.members {
        require("user_id", member.user_id.as_str())?;
        require("username", &member.username)?;
    }

    let team = state.directory.create_team(team).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

pub async fn get_team(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TeamNameQuery>, QueryRejection>,
) -> ApiResult<Json<Team>> {
    let Query(query) = query?;
    require("team_name", &query.team_name)?;

    Ok(Json(state.directory.get_team(&query.team_name).await?))
}

pub async fn bulk_deactivate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TeamNameRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(req) = body?;
    require("team_name", &req.team_name)?;

    state.directory.deactivate_team(&req.team_name).await?;
    Ok(Json(MessageResponse {
        message: "team members deactivated successfully",
    }))
}

pub async fn set_is_active(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let Json(req) = body?;
    require("user_id", req.user_id.as_str())?;

    let user = state
        .directory
        .set_user_active(req.user_id, req.is_active)
        .await?;
    Ok(Json(UserResponse { user }))
}

pub async fn get_review(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserIdQuery>, QueryRejection>,
) -> ApiResult<Json<UserReviewsResponse>> {
    let Query(query) = query?;
    require("user_id", query.user_id.as_str())?;

    let pull_requests = state
        .engine
        .pull_requests_for_reviewer(query.user_id.clone())
        .await?;
    Ok(Json(UserReviewsResponse {
        user_id: query.user_id,
        pull_requests,
    }))
}

// =============================================================================
// Pull requests
// =============================================================================

pub async fn create_pull_request(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PullRequestResponse>)> {
    let Json(req) = body?;
    require("pull_request_id", req.pull_request_id.as_str())?;
    require("pull_request_name", &req.pull_request_name)?;
    require("author_id", req.author_id.as_str())?;

    let pr = state
        .engine
        .create_pull_request(req.pull_request_id, req.pull_request_name, req.author_id)
        .await?;
    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

pub async fn merge_pull_request(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MergePullRequestRequest>, JsonRejection>,
) -> ApiResult<Json<PullRequestResponse>> {
    let Json(req) = body?;
    require("pull_request_id", req.pull_request_id.as_str())?;

    let pr = state.engine.merge_pull_request(req.pull_request_id).await?;
    Ok(Json(PullRequestResponse { pr }))
}

pub async fn reassign_reviewer(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReassignRequest>, JsonRejection>,
) -> ApiResult<Json<ReassignResponse>> {
    let Json(req) = body?;
    require("pull_request_id", req.pull_request_id.as_str())?;
    require("old_user_id", req.old_user_id.as_str())?;

    let outcome = state
        .engine
        .reassign_reviewer(req.pull_request_id, req.old_user_id)
        .await?;
    Ok(Json(ReassignResponse {
        pr: outcome.pull_request,
        replaced_by: outcome.replaced_by,
    }))
}

// =============================================================================
// Statistics and health
// =============================================================================

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let user_stats = state.statistics.reviewer_stats().await.map_err(|e| {
        error!("Failed to load reviewer stats: {}", e);
        ApiError::internal()
    })?;
    let pr_stats = state.statistics.pull_request_stats().await.map_err(|e| {
        error!("Failed to load pull request stats: {}", e);
        ApiError::internal()
    })?;

    Ok(Json(StatsResponse {
        user_stats,
        pr_stats,
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let timestamp = Utc::now().to_rfc3339();
    match state.health.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            timestamp,
            database: "healthy",
        })
        .into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    timestamp,
                    database: "unhealthy",
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("team_name", "backend").is_ok());

        let err = require("team_name", "   ").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "INVALID_REQUEST");
        assert_eq!(err.message, "team_name is required");
    }
}
