use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::TokenResponse,
    entities::user,
    handlers::common::{created_response, CreatedResult},
    services::users::NewUser,
    ApiResponse, ApiResult, AppState,
};

/// Login request payload
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Creates an account. The password hash never leaves the service.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> CreatedResult<user::Model> {
    let created = state.services.users.create_user(payload).await?;
    Ok(created_response(created))
}

/// Exchanges credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<TokenResponse> {
    let user = state
        .services
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = state.auth.generate_token(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(ApiResponse::success(token)))
}
