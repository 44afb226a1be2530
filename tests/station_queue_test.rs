use axum::http::StatusCode;
use fuel_queue_tests::TestApp;
use shared::models::queue::responses::{
    ErrorResponse, QueueSummary, RenumberResult, StationHistory, StationStats,
};
use shared::models::queue::{QueueEntry, QueueStatus};
use uuid::Uuid;

const STATION: &str = "station-1";

#[tokio::test]
async fn test_cancel_closes_gap_in_station_queue() {
    let app = TestApp::new();
    let a = app.submit("car-a", STATION, 10.0).await;
    let b = app.submit("car-b", STATION, 20.0).await;
    let c = app.submit("car-c", STATION, 30.0).await;

    let response = app.act(STATION, b.id, "cancel", None).await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<QueueEntry>().status, QueueStatus::Cancelled);

    let queue = app.station_queue(STATION).await;
    let positions: Vec<(Uuid, u32)> = queue.iter().map(|e| (e.id, e.queue_position)).collect();
    assert_eq!(positions, vec![(a.id, 1), (c.id, 2)]);
}

#[tokio::test]
async fn test_serve_and_complete_counts_towards_daily_stats() {
    let app = TestApp::new();
    let a = app.submit("car-a", STATION, 20.0).await;
    app.submit("car-b", STATION, 20.0).await;

    app.act(STATION, a.id, "start", None)
        .await
        .assert_status(StatusCode::OK);
    let queue = app.station_queue(STATION).await;
    assert_eq!(queue[0].id, a.id);
    assert_eq!(queue[0].status, QueueStatus::Serving);
    assert_eq!(queue[1].queue_position, 1);

    let response = app.act(STATION, a.id, "complete", Some(15.5)).await;
    response.assert_status(StatusCode::OK);
    let completed = response.json::<QueueEntry>();
    assert_eq!(completed.status, QueueStatus::Completed);
    assert_eq!(completed.served_amount, Some(15.5));
    assert!(completed.completed_at.is_some());

    let response = app
        .server
        .get("/station/stats")
        .authorization_bearer(app.token(STATION))
        .await;
    response.assert_status(StatusCode::OK);
    let stats = response.json::<StationStats>();
    assert_eq!(stats.pending_count, 1);
    assert_eq!(stats.serving_count, 0);
    assert_eq!(stats.completed_today_count, 1);
    assert_eq!(stats.fuel_sold_today, 15.5);
}

#[tokio::test]
async fn test_stats_for_quiet_day_are_zero() {
    let app = TestApp::new();

    let response = app
        .server
        .get("/station/stats")
        .add_query_param("date", "2020-01-01")
        .authorization_bearer(app.token(STATION))
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<StationStats>(), StationStats::default());
}

#[tokio::test]
async fn test_complete_on_pending_entry_conflicts() {
    let app = TestApp::new();
    let a = app.submit("car-a", STATION, 20.0).await;

    let response = app.act(STATION, a.id, "complete", Some(10.0)).await;

    response.assert_status(StatusCode::CONFLICT);
    let body = response.json::<ErrorResponse>();
    assert_eq!(body.error, "invalid_transition");
}

#[tokio::test]
async fn test_complete_without_served_amount_is_bad_request() {
    let app = TestApp::new();
    let a = app.submit("car-a", STATION, 20.0).await;
    app.act(STATION, a.id, "start", None)
        .await
        .assert_status(StatusCode::OK);

    let response = app.act(STATION, a.id, "complete", None).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ErrorResponse>().error, "invalid_amount");
}

#[tokio::test]
async fn test_station_cannot_touch_other_stations_entries() {
    let app = TestApp::new();
    let a = app.submit("car-a", STATION, 20.0).await;

    let response = app.act("station-2", a.id, "start", None).await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(app.station_queue(STATION).await[0].status, QueueStatus::Pending);
}

#[tokio::test]
async fn test_unknown_entry_is_not_found() {
    let app = TestApp::new();

    let response = app.act(STATION, Uuid::new_v4(), "start", None).await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<ErrorResponse>().error, "not_found");
}

#[tokio::test]
async fn test_renumber_compacts_gaps_left_by_withdrawals() {
    let app = TestApp::new();
    app.config
        .update(|config| config.renumber_on_withdraw = false);
    let a = app.submit("car-a", STATION, 10.0).await;
    app.submit("car-b", STATION, 10.0).await;
    app.submit("car-c", STATION, 10.0).await;
    app.server
        .delete(&format!("/queue/{}", a.id))
        .authorization_bearer(app.token("car-a"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = app
        .server
        .post("/station/queue/renumber")
        .authorization_bearer(app.token(STATION))
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<RenumberResult>().moved, 2);
    let positions: Vec<u32> = app
        .station_queue(STATION)
        .await
        .iter()
        .map(|e| e.queue_position)
        .collect();
    assert_eq!(positions, vec![1, 2]);
}

#[tokio::test]
async fn test_history_lists_latest_completions_first() {
    let app = TestApp::new();
    for (car, served) in [("car-a", 10.0), ("car-b", 12.25)] {
        let entry = app.submit(car, STATION, 30.0).await;
        app.act(STATION, entry.id, "start", None)
            .await
            .assert_status(StatusCode::OK);
        app.act(STATION, entry.id, "complete", Some(served))
            .await
            .assert_status(StatusCode::OK);
    }

    let response = app
        .server
        .get("/station/history")
        .add_query_param("limit", 1)
        .authorization_bearer(app.token(STATION))
        .await;

    response.assert_status(StatusCode::OK);
    let history = response.json::<StationHistory>();
    assert_eq!(history.entries.len(), 1);
    assert_eq!(history.entries[0].car_user_id, "car-b");
    assert_eq!(history.count, 2);
    assert_eq!(history.total_fuel, 22.25);
}

#[tokio::test]
async fn test_summary_is_public() {
    let app = TestApp::new();
    app.submit("car-a", STATION, 10.0).await;
    app.submit("car-b", STATION, 10.0).await;

    let response = app
        .server
        .get(&format!("/stations/{}/summary", STATION))
        .await;

    response.assert_status(StatusCode::OK);
    let summary = response.json::<QueueSummary>();
    assert_eq!(summary.active_count, 2);
    assert_eq!(summary.estimated_wait_minutes, 10);
}
