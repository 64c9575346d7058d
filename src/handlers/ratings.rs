use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::rating,
    handlers::common::{created_response, CreatedResult},
    services::ratings::{NewRating, RatingPatch, RatingSummary},
    ApiResponse, ApiResult, AppState,
};

pub fn rating_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:id/rate",
            post(submit_rating).get(get_my_rating).put(update_rating),
        )
        .route("/users/:id/average-rating", get(average_rating))
        .route("/users/:id/reviews", get(list_reviews))
}

pub async fn submit_rating(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<NewRating>,
) -> CreatedResult<rating::Model> {
    let created = state
        .services
        .ratings
        .submit_rating(project_id, auth.user_id, payload)
        .await?;
    Ok(created_response(created))
}

/// The caller's own rating on the project.
pub async fn get_my_rating(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<rating::Model> {
    let found = state
        .services
        .ratings
        .get_rating(project_id, auth.user_id)
        .await?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn update_rating(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<RatingPatch>,
) -> ApiResult<rating::Model> {
    let updated = state
        .services
        .ratings
        .update_rating(project_id, auth.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn average_rating(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<RatingSummary> {
    let summary = state.services.ratings.average_rating(user_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<rating::Model>> {
    let reviews = state.services.ratings.list_reviews(user_id).await?;
    Ok(Json(ApiResponse::success(reviews)))
}
