use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{project, submission_version},
    errors::ServiceError,
    handlers::common::{created_response, CreatedResult, MultipartForm, PaginationParams},
    services::projects::{NewProject, ProjectPatch, SubmissionSource},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct SelectContractorRequest {
    pub contractor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project).get(list_open_projects))
        .route("/projects/:id", get(get_project).patch(update_project))
        .route("/projects/:id/publish", post(publish_project))
        .route("/projects/:id/select-contractor", post(select_contractor))
        .route("/projects/:id/submit", post(submit_project))
        .route("/projects/:id/accept", post(accept_project))
        .route("/projects/:id/reject", post(reject_project))
        .route("/projects/:id/submissions", get(list_submissions))
        .route("/users/:id/projects", get(list_user_projects))
}

pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NewProject>,
) -> CreatedResult<project::Model> {
    let created = state
        .services
        .projects
        .create_project(auth.user_id, payload)
        .await?;
    Ok(created_response(created))
}

/// Projects currently accepting bids.
pub async fn list_open_projects(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<project::Model>> {
    let (page, limit) = params.normalized();
    let (items, total) = state
        .services
        .projects
        .list_open_projects(page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

pub async fn get_project(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<project::Model> {
    let found = state.services.projects.get_project(id).await?;
    Ok(Json(ApiResponse::success(found)))
}

/// Unknown fields, `status` included, are refused with 400.
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<ProjectPatch>, JsonRejection>,
) -> ApiResult<project::Model> {
    let Json(patch) = payload.map_err(|e| ServiceError::ValidationError(e.body_text()))?;
    let updated = state
        .services
        .projects
        .update_project_details(id, auth.user_id, patch)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn publish_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<project::Model> {
    let updated = state.services.projects.publish(id, auth.user_id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn select_contractor(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectContractorRequest>,
) -> ApiResult<project::Model> {
    let updated = state
        .services
        .projects
        .select_contractor(id, auth.user_id, payload.contractor_id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Multipart body with either a `file` part or a `submission_file_url` field.
pub async fn submit_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<project::Model> {
    let mut form = MultipartForm::read(multipart).await?;
    let source = match form.file.take() {
        Some(upload) => SubmissionSource::Upload(upload),
        None => match form.text("submission_file_url") {
            Some(url) => SubmissionSource::Url(url.to_string()),
            None => {
                return Err(ServiceError::ValidationError(
                    "Provide a file or a submission_file_url".into(),
                ))
            }
        },
    };
    let updated = state
        .services
        .projects
        .submit(id, auth.user_id, source)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn accept_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<project::Model> {
    let updated = state.services.projects.accept(id, auth.user_id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn reject_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> ApiResult<project::Model> {
    let updated = state
        .services
        .projects
        .reject(id, auth.user_id, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn list_submissions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<submission_version::Model>> {
    let versions = state.services.projects.list_submissions(id).await?;
    Ok(Json(ApiResponse::success(versions)))
}

pub async fn list_user_projects(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<project::Model>> {
    let projects = state.services.projects.list_user_projects(user_id).await?;
    Ok(Json(ApiResponse::success(projects)))
}
