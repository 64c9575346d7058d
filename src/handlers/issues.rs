use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{issue, issue_comment},
    errors::ServiceError,
    handlers::common::{created_response, CreatedResult},
    services::issues::{NewComment, NewIssue},
    ApiResponse, ApiResult, AppState,
};

pub fn issue_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/issues", post(create_issue).get(list_issues))
        .route(
            "/projects/:id/issues/:issue_id/resolve",
            post(resolve_issue),
        )
        .route(
            "/projects/:id/issues/:issue_id/comments",
            post(add_comment).get(list_comments),
        )
}

/// The issue must belong to the project named in the path.
async fn issue_in_project(
    state: &AppState,
    project_id: Uuid,
    issue_id: Uuid,
) -> Result<issue::Model, ServiceError> {
    let found = state.services.issues.get_issue(issue_id).await?;
    if found.project_id != project_id {
        return Err(ServiceError::not_found("Issue", issue_id));
    }
    Ok(found)
}

pub async fn create_issue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<NewIssue>,
) -> CreatedResult<issue::Model> {
    let created = state
        .services
        .issues
        .create_issue(project_id, auth.user_id, payload)
        .await?;
    Ok(created_response(created))
}

pub async fn list_issues(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Vec<issue::Model>> {
    let issues = state.services.issues.list_issues(project_id).await?;
    Ok(Json(ApiResponse::success(issues)))
}

pub async fn resolve_issue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, issue_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<issue::Model> {
    issue_in_project(&state, project_id, issue_id).await?;
    let resolved = state
        .services
        .issues
        .resolve_issue(issue_id, auth.user_id)
        .await?;
    Ok(Json(ApiResponse::success(resolved)))
}

pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, issue_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<NewComment>,
) -> CreatedResult<issue_comment::Model> {
    issue_in_project(&state, project_id, issue_id).await?;
    let comment = state
        .services
        .issues
        .add_comment(issue_id, auth.user_id, payload)
        .await?;
    Ok(created_response(comment))
}

pub async fn list_comments(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((project_id, issue_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Vec<issue_comment::Model>> {
    issue_in_project(&state, project_id, issue_id).await?;
    let comments = state.services.issues.list_comments(issue_id).await?;
    Ok(Json(ApiResponse::success(comments)))
}
