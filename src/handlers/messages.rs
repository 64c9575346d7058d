use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::message,
    handlers::common::{created_response, CreatedResult},
    services::messages::NewMessage,
    ApiResponse, ApiResult, AppState,
};

pub fn message_routes() -> Router<AppState> {
    Router::new().route(
        "/projects/:id/messages",
        post(post_message).get(list_messages),
    )
}

pub async fn post_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<NewMessage>,
) -> CreatedResult<message::Model> {
    let created = state
        .services
        .messages
        .post_message(project_id, auth.user_id, payload)
        .await?;
    Ok(created_response(created))
}

pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Vec<message::Model>> {
    let messages = state
        .services
        .messages
        .list_messages(project_id, auth.user_id)
        .await?;
    Ok(Json(ApiResponse::success(messages)))
}
