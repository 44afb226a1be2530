use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use lambda_http::tracing::{debug, error};
use uuid::Uuid;

use crate::{error::ApiError, middleware::auth::AuthenticatedUser, state::AppState};
use shared::models::queue::requests::SubmitQueueRequest;
use shared::models::queue::responses::CarQueueEntry;
use shared::models::queue::QueueEntry;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_my_entries).post(submit_request))
        .route("/queue/{entry_id}", delete(withdraw))
}

async fn submit_request(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Json(payload): Json<SubmitQueueRequest>,
) -> Result<(StatusCode, Json<QueueEntry>), ApiError> {
    let car_user_id = authenticated_user.user_id;

    let entry = state
        .coordinator
        .submit_request(
            &car_user_id,
            &payload.station_user_id,
            payload.fuel_type,
            payload.requested_amount,
        )
        .await
        .map_err(|e| {
            error!(
                "Failed to queue car {} at {}: {}",
                car_user_id, payload.station_user_id, e
            );
            ApiError::from(e)
        })?;

    debug!("Car {} queued as entry {}", car_user_id, entry.id);
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_my_entries(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<Vec<CarQueueEntry>>, ApiError> {
    state
        .coordinator
        .list_active_for_car(&authenticated_user.user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "Failed to list entries for car {}: {}",
                authenticated_user.user_id, e
            );
            ApiError::from(e)
        })
}

async fn withdraw(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let car_user_id = authenticated_user.user_id;

    let entry = state.coordinator.get_entry(entry_id).await.map_err(|e| {
        error!("Failed to load entry {}: {}", entry_id, e);
        ApiError::from(e)
    })?;
    if entry.car_user_id != car_user_id {
        return Err(ApiError::Forbidden(format!(
            "Entry {} does not belong to this car",
            entry_id
        )));
    }

    state.coordinator.withdraw(entry_id).await.map_err(|e| {
        error!("Failed to withdraw entry {}: {}", entry_id, e);
        ApiError::from(e)
    })?;

    debug!("Car {} withdrew entry {}", car_user_id, entry_id);
    Ok(StatusCode::NO_CONTENT)
}
