pub mod requests;
pub mod responses;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fuel grades a car can queue for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum FuelType {
    Diesel,
    Benzene,
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelType::Diesel => write!(f, "Diesel"),
            FuelType::Benzene => write!(f, "Benzene"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Serving,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub const ACTIVE: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::Serving];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Serving => "serving",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }

    /// Whether `action` is a legal move out of this status.
    pub fn allows(&self, action: QueueAction) -> bool {
        if self.is_terminal() {
            return false;
        }
        match action {
            QueueAction::Start => *self == QueueStatus::Pending,
            QueueAction::Complete => *self == QueueStatus::Serving,
            QueueAction::Skip | QueueAction::Cancel => true,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Station-side actions on a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Start,
    Complete,
    Skip,
    Cancel,
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueAction::Start => write!(f, "start"),
            QueueAction::Complete => write!(f, "complete"),
            QueueAction::Skip => write!(f, "skip"),
            QueueAction::Cancel => write!(f, "cancel"),
        }
    }
}

/// One car's request for fuel at one station.
/// Stored as a single DynamoDB item keyed by `id`, with GSIs on
/// `station_user_id` and `car_user_id`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub car_user_id: String,
    pub station_user_id: String,
    pub fuel_type: FuelType,
    pub requested_amount: f64,
    #[serde(default)]
    pub served_amount: Option<f64>,
    pub status: QueueStatus,
    pub queue_position: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(
        car_user_id: &str,
        station_user_id: &str,
        fuel_type: FuelType,
        requested_amount: f64,
        queue_position: u32,
    ) -> Self {
        QueueEntry {
            id: Uuid::new_v4(),
            car_user_id: car_user_id.to_string(),
            station_user_id: station_user_id.to_string(),
            fuel_type,
            requested_amount,
            served_amount: None,
            status: QueueStatus::Pending,
            queue_position,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueueStatus::Pending
    }

    /// Returns the entry as it looks after `action`. Callers check
    /// `status.allows(action)` first; `served_amount` is only read for
    /// `Complete`.
    pub fn advanced(
        &self,
        action: QueueAction,
        served_amount: Option<f64>,
        now: DateTime<Utc>,
    ) -> QueueEntry {
        // Timestamps only move forward, even if the caller's clock lags.
        let now = now
            .max(self.created_at)
            .max(self.started_at.unwrap_or(self.created_at));
        let mut next = self.clone();
        match action {
            QueueAction::Start => {
                next.status = QueueStatus::Serving;
                next.started_at = Some(now);
            }
            QueueAction::Complete => {
                next.status = QueueStatus::Completed;
                next.served_amount = served_amount;
                next.completed_at = Some(now);
            }
            QueueAction::Skip | QueueAction::Cancel => {
                next.status = QueueStatus::Cancelled;
            }
        }
        next
    }
}

/// New position for one pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PositionUpdate {
    pub entry_id: Uuid,
    pub queue_position: u32,
}

/// Pending set of one station together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StationQueue {
    pub station_user_id: String,
    pub version: u64,
    pub pending: Vec<QueueEntry>,
}

impl StationQueue {
    /// Pending entries minus `entry_id`.
    pub fn without(&self, entry_id: Uuid) -> Vec<QueueEntry> {
        self.pending
            .iter()
            .filter(|entry| entry.id != entry_id)
            .cloned()
            .collect()
    }

    pub fn next_position(&self) -> u32 {
        next_position(&self.pending)
    }
}

/// Serve order: stored position, then arrival, then id so that duplicate
/// positions still sort deterministically.
pub fn sort_by_serve_order(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| {
        a.queue_position
            .cmp(&b.queue_position)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Compacts `pending` to positions 1..N in serve order and returns only the
/// entries whose position changes.
pub fn renumber(pending: &[QueueEntry]) -> Vec<PositionUpdate> {
    let mut ordered = pending.to_vec();
    sort_by_serve_order(&mut ordered);

    ordered
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let queue_position = index as u32 + 1;
            (entry.queue_position != queue_position).then_some(PositionUpdate {
                entry_id: entry.id,
                queue_position,
            })
        })
        .collect()
}

/// Position for a newly submitted entry. Equal to `pending.len() + 1` while
/// the positions are contiguous; never collides with a stored position when
/// they are not.
pub fn next_position(pending: &[QueueEntry]) -> u32 {
    let highest = pending
        .iter()
        .map(|entry| entry.queue_position)
        .max()
        .unwrap_or(0);
    highest.max(pending.len() as u32) + 1
}

/// Number of pending entries at the entry's station that are served before
/// it. Serving entries report 0.
pub fn cars_ahead(entry: &QueueEntry, station_pending: &[QueueEntry]) -> usize {
    if !entry.is_pending() {
        return 0;
    }
    station_pending
        .iter()
        .filter(|other| {
            other.is_pending()
                && other.station_user_id == entry.station_user_id
                && other.queue_position < entry.queue_position
        })
        .count()
}
