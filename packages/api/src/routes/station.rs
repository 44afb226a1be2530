use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use lambda_http::tracing::{debug, error};
use uuid::Uuid;

use crate::{error::ApiError, middleware::auth::AuthenticatedUser, state::AppState};
use shared::models::queue::requests::{AdvanceRequest, HistoryQuery, StatsQuery};
use shared::models::queue::responses::{
    QueueSummary, RenumberResult, StationHistory, StationStats,
};
use shared::models::queue::QueueEntry;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/station/queue", get(list_station_queue))
        .route("/station/queue/renumber", post(renumber_queue))
        .route("/station/queue/{entry_id}/actions", post(advance_entry))
        .route("/station/stats", get(daily_stats))
        .route("/station/history", get(completed_history))
        .route("/stations/{station_user_id}/summary", get(queue_summary))
}

async fn list_station_queue(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<Vec<QueueEntry>>, ApiError> {
    state
        .coordinator
        .list_active_for_station(&authenticated_user.user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "Failed to list queue for station {}: {}",
                authenticated_user.user_id, e
            );
            ApiError::from(e)
        })
}

async fn advance_entry(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(entry_id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<QueueEntry>, ApiError> {
    let station_user_id = authenticated_user.user_id;

    let entry = state.coordinator.get_entry(entry_id).await.map_err(|e| {
        error!("Failed to load entry {}: {}", entry_id, e);
        ApiError::from(e)
    })?;
    if entry.station_user_id != station_user_id {
        return Err(ApiError::Forbidden(format!(
            "Entry {} is not queued at this station",
            entry_id
        )));
    }

    let updated = state
        .coordinator
        .advance(entry_id, payload.action, payload.served_amount)
        .await
        .map_err(|e| {
            error!(
                "Failed to {} entry {} at {}: {}",
                payload.action, entry_id, station_user_id, e
            );
            ApiError::from(e)
        })?;

    debug!(
        "Station {} applied {} to entry {}",
        station_user_id, payload.action, entry_id
    );
    Ok(Json(updated))
}

async fn renumber_queue(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<RenumberResult>, ApiError> {
    let moved = state
        .coordinator
        .renumber_pending(&authenticated_user.user_id)
        .await
        .map_err(|e| {
            error!(
                "Failed to renumber queue for station {}: {}",
                authenticated_user.user_id, e
            );
            ApiError::from(e)
        })?;

    debug!(
        "Station {} renumbered {} entries",
        authenticated_user.user_id, moved
    );
    Ok(Json(RenumberResult { moved }))
}

async fn daily_stats(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StationStats>, ApiError> {
    let date = query.date.unwrap_or_else(|| state.stats_service.today());

    state
        .stats_service
        .daily_stats(&authenticated_user.user_id, date)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "Failed to compute stats for station {} on {}: {}",
                authenticated_user.user_id, date, e
            );
            ApiError::from(e)
        })
}

async fn completed_history(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<StationHistory>, ApiError> {
    state
        .stats_service
        .completed_history(&authenticated_user.user_id, query.limit)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "Failed to load history for station {}: {}",
                authenticated_user.user_id, e
            );
            ApiError::from(e)
        })
}

/// Public: cars look at a station's line before joining it.
async fn queue_summary(
    State(state): State<AppState>,
    Path(station_user_id): Path<String>,
) -> Result<Json<QueueSummary>, ApiError> {
    state
        .stats_service
        .queue_summary(&station_user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Failed to summarize station {}: {}", station_user_id, e);
            ApiError::from(e)
        })
}
