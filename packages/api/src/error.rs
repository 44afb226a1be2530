use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::queue::responses::ErrorResponse;
use shared::services::errors::queue_service_errors::QueueServiceError;

use crate::services::errors::auth_service_errors::AuthServiceError;

#[derive(Debug)]
pub enum ApiError {
    QueueService(QueueServiceError),
    AuthService(AuthServiceError),
    /// Authenticated, but the entry belongs to someone else.
    Forbidden(String),
}

impl From<QueueServiceError> for ApiError {
    fn from(error: QueueServiceError) -> Self {
        ApiError::QueueService(error)
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(error: AuthServiceError) -> Self {
        ApiError::AuthService(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::QueueService(
                QueueServiceError::ValidationError(_) | QueueServiceError::InvalidAmount(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::QueueService(QueueServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::QueueService(QueueServiceError::InvalidTransition { .. }) => {
                StatusCode::CONFLICT
            }
            ApiError::QueueService(QueueServiceError::StoreFailure(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ApiError::AuthService(
                AuthServiceError::MissingToken
                | AuthServiceError::InvalidToken
                | AuthServiceError::ExpiredToken,
            ) => StatusCode::UNAUTHORIZED,
            ApiError::AuthService(AuthServiceError::JwtError(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn body(&self) -> ErrorResponse {
        let (error, message) = match self {
            ApiError::QueueService(QueueServiceError::StoreFailure(_)) => (
                "store_failure",
                // Store details stay in the logs.
                "The queue store is unavailable".to_string(),
            ),
            ApiError::QueueService(err) => (err.kind(), err.to_string()),
            ApiError::AuthService(AuthServiceError::JwtError(_)) => {
                ("internal_error", "Token handling failed".to_string())
            }
            ApiError::AuthService(err) => ("unauthorized", err.to_string()),
            ApiError::Forbidden(message) => ("forbidden", message.clone()),
        };
        ErrorResponse {
            error: error.to_string(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::queue::{QueueAction, QueueStatus};
    use shared::repositories::errors::queue_repository_errors::QueueRepositoryError;
    use test_case::test_case;
    use uuid::Uuid;

    #[test_case(QueueServiceError::ValidationError("x".into()).into(), StatusCode::BAD_REQUEST ; "validation")]
    #[test_case(QueueServiceError::InvalidAmount(Some(-1.0)).into(), StatusCode::BAD_REQUEST ; "amount")]
    #[test_case(QueueServiceError::NotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND ; "not found")]
    #[test_case(
        QueueServiceError::InvalidTransition { action: QueueAction::Start, status: QueueStatus::Serving }.into(),
        StatusCode::CONFLICT ;
        "invalid transition"
    )]
    #[test_case(
        QueueServiceError::StoreFailure(QueueRepositoryError::VersionConflict).into(),
        StatusCode::INTERNAL_SERVER_ERROR ;
        "store failure"
    )]
    #[test_case(AuthServiceError::MissingToken.into(), StatusCode::UNAUTHORIZED ; "missing token")]
    #[test_case(AuthServiceError::ExpiredToken.into(), StatusCode::UNAUTHORIZED ; "expired token")]
    #[test_case(ApiError::Forbidden("not yours".into()), StatusCode::FORBIDDEN ; "forbidden")]
    fn test_status_mapping(error: ApiError, expected: StatusCode) {
        assert_eq!(error.status(), expected);
    }

    #[test]
    fn test_body_carries_stable_kind() {
        let body = ApiError::from(QueueServiceError::InvalidTransition {
            action: QueueAction::Complete,
            status: QueueStatus::Pending,
        })
        .body();

        assert_eq!(body.error, "invalid_transition");
        assert_eq!(body.message, "Cannot complete an entry that is pending");
    }

    #[test]
    fn test_store_details_are_not_leaked() {
        let body = ApiError::from(QueueServiceError::StoreFailure(
            QueueRepositoryError::DynamoDb("arn:aws:dynamodb:secret".into()),
        ))
        .body();

        assert_eq!(body.error, "store_failure");
        assert!(!body.message.contains("arn"));
    }
}
