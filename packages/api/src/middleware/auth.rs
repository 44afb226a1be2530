use axum::{extract::FromRequestParts, http::request::Parts};

use crate::services::auth_service::AuthServiceTrait;
use crate::services::errors::auth_service_errors::AuthServiceError;
use crate::{error::ApiError, state::AppState};

/// Caller identity taken from the bearer token's `sub` claim.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .ok_or(AuthServiceError::MissingToken)?
            .to_str()
            .map_err(|_| AuthServiceError::InvalidToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthServiceError::MissingToken)?;

        let user_id = state.auth_service.extract_user_id_from_token(token)?;

        Ok(AuthenticatedUser { user_id })
    }
}
