use std::str::FromStr;

use axum::{
    extract::{Multipart, Path, State},
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::proposal_file,
    errors::ServiceError,
    handlers::common::{created_response, CreatedResult, MultipartForm},
    services::proposals::{NewProposal, ProposalWithFile},
    ApiResponse, ApiResult, AppState,
};

pub fn proposal_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:id/proposals",
            post(create_proposal).get(list_proposals),
        )
        .route(
            "/proposals/:id/files",
            post(upload_proposal_file).get(list_proposal_files),
        )
}

/// Multipart body: `price`, optional `description`, optional PDF `file`.
pub async fn create_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> CreatedResult<ProposalWithFile> {
    let mut form = MultipartForm::read(multipart).await?;
    let price = form
        .text("price")
        .ok_or_else(|| ServiceError::ValidationError("price is required".into()))
        .and_then(parse_price)?;
    let input = NewProposal {
        price,
        description: form.text("description").map(str::to_string),
    };

    let created = state
        .services
        .proposals
        .create_proposal(project_id, auth.user_id, input, form.file.take())
        .await?;
    Ok(created_response(created))
}

pub async fn list_proposals(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Vec<ProposalWithFile>> {
    let proposals = state.services.proposals.list_proposals(project_id).await?;
    Ok(Json(ApiResponse::success(proposals)))
}

/// Adds the next PDF version to a proposal.
pub async fn upload_proposal_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
    multipart: Multipart,
) -> CreatedResult<proposal_file::Model> {
    let form = MultipartForm::read(multipart).await?;
    let upload = form
        .file
        .ok_or_else(|| ServiceError::ValidationError("file is required".into()))?;
    let file = state
        .services
        .proposals
        .attach_proposal_file(proposal_id, auth.user_id, upload)
        .await?;
    Ok(created_response(file))
}

pub async fn list_proposal_files(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> ApiResult<Vec<proposal_file::Model>> {
    let files = state
        .services
        .proposals
        .list_proposal_files(proposal_id)
        .await?;
    Ok(Json(ApiResponse::success(files)))
}

fn parse_price(raw: &str) -> Result<Decimal, ServiceError> {
    Decimal::from_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("Invalid price: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn price_parses_decimal_text() {
        assert_eq!(parse_price("150.25").unwrap(), Decimal::new(15025, 2));
        assert_matches!(parse_price("cheap"), Err(ServiceError::ValidationError(_)));
    }
}
