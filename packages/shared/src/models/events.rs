use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of record a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    QueueEntry,
    StationQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    Renumbered,
}

/// One committed mutation. `entity_id` is the queue entry id for
/// `QueueEntry` events and empty for station-wide events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub entity_id: Option<Uuid>,
    pub station_user_id: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn entry(entry_id: Uuid, station_user_id: &str, kind: ChangeKind) -> Self {
        ChangeEvent {
            entity: EntityKind::QueueEntry,
            entity_id: Some(entry_id),
            station_user_id: station_user_id.to_string(),
            kind,
        }
    }

    pub fn renumbered(station_user_id: &str) -> Self {
        ChangeEvent {
            entity: EntityKind::StationQueue,
            entity_id: None,
            station_user_id: station_user_id.to_string(),
            kind: ChangeKind::Renumbered,
        }
    }
}
