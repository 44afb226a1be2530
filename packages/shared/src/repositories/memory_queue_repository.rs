use crate::models::queue::{sort_by_serve_order, PositionUpdate, QueueEntry, QueueStatus, StationQueue};
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;
use crate::repositories::queue_repository::{
    EntryRemoval, EntryTransition, QueueRepository, MAX_TRANSACTION_ITEMS,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<Uuid, QueueEntry>,
    versions: HashMap<String, u64>,
}

impl MemoryState {
    fn check_version(
        &self,
        station_user_id: &str,
        expected_version: Option<u64>,
    ) -> Result<(), QueueRepositoryError> {
        match expected_version {
            Some(expected) if self.version(station_user_id) != expected => {
                Err(QueueRepositoryError::VersionConflict)
            }
            _ => Ok(()),
        }
    }

    fn version(&self, station_user_id: &str) -> u64 {
        self.versions.get(station_user_id).copied().unwrap_or(0)
    }

    fn bump(&mut self, station_user_id: &str) {
        *self.versions.entry(station_user_id.to_string()).or_insert(0) += 1;
    }

    /// Checks that every update targets a pending entry of the station.
    fn check_positions(
        &self,
        station_user_id: &str,
        updates: &[PositionUpdate],
        skip: Option<Uuid>,
    ) -> Result<(), QueueRepositoryError> {
        for update in updates {
            if Some(update.entry_id) == skip {
                return Err(QueueRepositoryError::VersionConflict);
            }
            match self.entries.get(&update.entry_id) {
                Some(entry) if entry.is_pending() && entry.station_user_id == station_user_id => {}
                _ => return Err(QueueRepositoryError::VersionConflict),
            }
        }
        Ok(())
    }

    fn write_positions(&mut self, updates: &[PositionUpdate]) {
        for update in updates {
            if let Some(entry) = self.entries.get_mut(&update.entry_id) {
                entry.queue_position = update.queue_position;
            }
        }
    }
}

/// Process-local store with the same atomicity and versioning rules as the
/// DynamoDB store. Every call holds one lock for its whole duration.
#[derive(Debug, Default)]
pub struct InMemoryQueueRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn load_station_queue(
        &self,
        station_user_id: &str,
    ) -> Result<StationQueue, QueueRepositoryError> {
        let state = self.state.lock().await;
        let mut pending: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|entry| entry.is_pending() && entry.station_user_id == station_user_id)
            .cloned()
            .collect();
        sort_by_serve_order(&mut pending);

        Ok(StationQueue {
            station_user_id: station_user_id.to_string(),
            version: state.version(station_user_id),
            pending,
        })
    }

    async fn insert_entry(
        &self,
        entry: &QueueEntry,
        expected_version: u64,
    ) -> Result<(), QueueRepositoryError> {
        let mut state = self.state.lock().await;
        state.check_version(&entry.station_user_id, Some(expected_version))?;
        if state.entries.contains_key(&entry.id) {
            return Err(QueueRepositoryError::VersionConflict);
        }

        state.entries.insert(entry.id, entry.clone());
        state.bump(&entry.station_user_id);
        Ok(())
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<QueueEntry, QueueRepositoryError> {
        let state = self.state.lock().await;
        state
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or(QueueRepositoryError::NotFound)
    }

    async fn commit_transition(
        &self,
        transition: &EntryTransition,
    ) -> Result<(), QueueRepositoryError> {
        if transition.renumbered.len() + 2 > MAX_TRANSACTION_ITEMS {
            return Err(QueueRepositoryError::BatchTooLarge(
                transition.renumbered.len() + 2,
            ));
        }

        let mut state = self.state.lock().await;
        let station_user_id = transition.entry.station_user_id.as_str();
        state.check_version(station_user_id, Some(transition.expected_version))?;

        match state.entries.get(&transition.entry.id) {
            Some(current) if current.status == transition.expected_status => {}
            Some(_) => return Err(QueueRepositoryError::StatusConflict),
            None => return Err(QueueRepositoryError::NotFound),
        }
        state.check_positions(
            station_user_id,
            &transition.renumbered,
            Some(transition.entry.id),
        )?;

        state
            .entries
            .insert(transition.entry.id, transition.entry.clone());
        state.write_positions(&transition.renumbered);
        state.bump(station_user_id);
        Ok(())
    }

    async fn apply_positions(
        &self,
        station_user_id: &str,
        updates: &[PositionUpdate],
        expected_version: u64,
    ) -> Result<(), QueueRepositoryError> {
        if updates.len() + 1 > MAX_TRANSACTION_ITEMS {
            return Err(QueueRepositoryError::BatchTooLarge(updates.len() + 1));
        }

        let mut state = self.state.lock().await;
        state.check_version(station_user_id, Some(expected_version))?;
        state.check_positions(station_user_id, updates, None)?;

        state.write_positions(updates);
        state.bump(station_user_id);
        Ok(())
    }

    async fn remove_entry(
        &self,
        removal: &EntryRemoval,
    ) -> Result<QueueEntry, QueueRepositoryError> {
        if removal.renumbered.len() + 2 > MAX_TRANSACTION_ITEMS {
            return Err(QueueRepositoryError::BatchTooLarge(
                removal.renumbered.len() + 2,
            ));
        }

        let mut state = self.state.lock().await;
        state.check_version(&removal.station_user_id, removal.expected_version)?;
        if !state.entries.contains_key(&removal.entry_id) {
            return Err(QueueRepositoryError::NotFound);
        }
        state.check_positions(
            &removal.station_user_id,
            &removal.renumbered,
            Some(removal.entry_id),
        )?;

        let removed = state
            .entries
            .remove(&removal.entry_id)
            .ok_or(QueueRepositoryError::NotFound)?;
        state.write_positions(&removal.renumbered);
        state.bump(&removal.station_user_id);
        Ok(removed)
    }

    async fn list_station_entries(
        &self,
        station_user_id: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .filter(|entry| {
                entry.station_user_id == station_user_id
                    && (statuses.is_empty() || statuses.contains(&entry.status))
            })
            .cloned()
            .collect())
    }

    async fn list_car_entries(
        &self,
        car_user_id: &str,
        statuses: &[QueueStatus],
    ) -> Result<Vec<QueueEntry>, QueueRepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .filter(|entry| {
                entry.car_user_id == car_user_id
                    && (statuses.is_empty() || statuses.contains(&entry.status))
            })
            .cloned()
            .collect())
    }

    async fn count_station_entries(
        &self,
        station_user_id: &str,
        status: QueueStatus,
    ) -> Result<usize, QueueRepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .filter(|entry| entry.station_user_id == station_user_id && entry.status == status)
            .count())
    }
}
