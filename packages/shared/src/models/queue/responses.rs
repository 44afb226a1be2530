use serde::{Deserialize, Serialize};

use super::QueueEntry;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// A car's active entry with its live place in line.
/// `rank` is computed fresh from the pending set, `entry.queue_position` is
/// the stored value and can lag behind when a gap has not been compacted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CarQueueEntry {
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub cars_ahead: usize,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StationStats {
    pub pending_count: usize,
    pub serving_count: usize,
    pub completed_today_count: usize,
    pub fuel_sold_today: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationHistory {
    pub entries: Vec<QueueEntry>,
    pub count: usize,
    pub total_fuel: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RenumberResult {
    pub moved: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueSummary {
    pub station_user_id: String,
    pub active_count: usize,
    pub pending_count: usize,
    pub estimated_wait_minutes: u32,
}
