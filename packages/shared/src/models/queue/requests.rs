use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{FuelType, QueueAction};

/// Body of a car's request to join a station's queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitQueueRequest {
    pub station_user_id: String,
    pub fuel_type: FuelType,
    pub requested_amount: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdvanceRequest {
    pub action: QueueAction,
    #[serde(default)]
    pub served_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatsQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}
