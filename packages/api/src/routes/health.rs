use axum::http::StatusCode;

/// Liveness probe; does not touch the store.
pub async fn health_check() -> (StatusCode, String) {
    (StatusCode::OK, "Healthy!".to_string())
}
