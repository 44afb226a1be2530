use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigHandle, CoordinatorConfig};
use crate::models::events::{ChangeEvent, ChangeKind};
use crate::models::queue::responses::CarQueueEntry;
use crate::models::queue::{
    cars_ahead, renumber, sort_by_serve_order, FuelType, PositionUpdate, QueueAction, QueueEntry,
    QueueStatus,
};
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;
use crate::repositories::queue_repository::{
    EntryRemoval, EntryTransition, QueueRepository, MAX_TRANSACTION_ITEMS,
};
use crate::services::change_bus::ChangeBus;
use crate::services::errors::queue_service_errors::QueueServiceError;

/// Position updates per compaction step; the station version bump takes the
/// last transaction slot.
const POSITION_CHUNK: usize = MAX_TRANSACTION_ITEMS - 1;

/// Owns every mutation of the fuel queue. Each write is checked against the
/// station version it was computed from and retried on conflict, so the
/// pending positions of a station stay `1..N` under concurrent callers.
#[derive(Clone)]
pub struct QueueCoordinator {
    repository: Arc<dyn QueueRepository + Send + Sync>,
    config: ConfigHandle,
    changes: ChangeBus,
}

impl QueueCoordinator {
    pub fn new(
        repository: Arc<dyn QueueRepository + Send + Sync>,
        config: ConfigHandle,
        changes: ChangeBus,
    ) -> Self {
        QueueCoordinator {
            repository,
            config,
            changes,
        }
    }

    pub fn changes(&self) -> &ChangeBus {
        &self.changes
    }

    /// Appends a pending entry at the end of the station's queue.
    pub async fn submit_request(
        &self,
        car_user_id: &str,
        station_user_id: &str,
        fuel_type: FuelType,
        requested_amount: f64,
    ) -> Result<QueueEntry, QueueServiceError> {
        if car_user_id.trim().is_empty() || station_user_id.trim().is_empty() {
            return Err(QueueServiceError::ValidationError(
                "Car and station cannot be empty".to_string(),
            ));
        }
        let requested_amount = positive_amount(Some(requested_amount))?;

        let config = self.config.current();
        let entry = self
            .with_retries(&config, "submit", || async move {
                let queue = self.repository.load_station_queue(station_user_id).await?;
                let entry = QueueEntry::new(
                    car_user_id,
                    station_user_id,
                    fuel_type,
                    requested_amount,
                    queue.next_position(),
                );
                self.repository.insert_entry(&entry, queue.version).await?;
                Ok::<_, QueueServiceError>(entry)
            })
            .await?;

        info!(
            "Queued {} for {} liters of {} at {} in position {}",
            car_user_id, requested_amount, fuel_type, station_user_id, entry.queue_position
        );
        self.changes.publish(ChangeEvent::entry(
            entry.id,
            station_user_id,
            ChangeKind::Created,
        ));
        Ok(entry)
    }

    /// Applies a station action. The status change and the renumbering of
    /// the remaining pending entries commit together or not at all, unless
    /// the queue is too long for one transaction. Then the status change
    /// commits alone and the positions are compacted right after it.
    pub async fn advance(
        &self,
        entry_id: Uuid,
        action: QueueAction,
        served_amount: Option<f64>,
    ) -> Result<QueueEntry, QueueServiceError> {
        let served_amount = match action {
            QueueAction::Complete => Some(positive_amount(served_amount)?),
            _ => None,
        };

        let config = self.config.current();
        let (transition, deferred) = self
            .with_retries(&config, "advance", || async move {
                let current = self.load_entry(entry_id).await?;
                if !current.status.allows(action) {
                    return Err(QueueServiceError::InvalidTransition {
                        action,
                        status: current.status,
                    });
                }

                let queue = self
                    .repository
                    .load_station_queue(&current.station_user_id)
                    .await?;
                let (renumbered, deferred) =
                    inline_renumbering(renumber(&queue.without(current.id)));
                let transition = EntryTransition {
                    entry: current.advanced(action, served_amount, Utc::now()),
                    expected_status: current.status,
                    renumbered,
                    expected_version: queue.version,
                };
                self.repository
                    .commit_transition(&transition)
                    .await
                    .map_err(entry_error(entry_id))?;
                Ok::<_, QueueServiceError>((transition, deferred))
            })
            .await?;

        let entry = transition.entry;
        info!(
            "Applied {} to entry {} at {}, now {}",
            action, entry.id, entry.station_user_id, entry.status
        );
        let mut renumbered = !transition.renumbered.is_empty();
        if deferred {
            renumbered |= self
                .compact_after_commit(&config, &entry.station_user_id)
                .await
                > 0;
        }
        self.changes.publish(ChangeEvent::entry(
            entry.id,
            &entry.station_user_id,
            ChangeKind::Updated,
        ));
        if renumbered {
            self.changes
                .publish(ChangeEvent::renumbered(&entry.station_user_id));
        }
        Ok(entry)
    }

    /// Compacts the station's pending positions to `1..N`. Returns how many
    /// entries moved.
    pub async fn renumber_pending(&self, station_user_id: &str) -> Result<usize, QueueServiceError> {
        let config = self.config.current();
        let moved = self.compact(&config, station_user_id).await?;

        if moved > 0 {
            debug!("Renumbered {} pending entries at {}", moved, station_user_id);
            self.changes
                .publish(ChangeEvent::renumbered(station_user_id));
        }
        Ok(moved)
    }

    /// Deletes an entry on behalf of its car. Whether the remaining pending
    /// entries are compacted follows `renumber_on_withdraw`.
    pub async fn withdraw(&self, entry_id: Uuid) -> Result<QueueEntry, QueueServiceError> {
        let config = self.config.current();
        let renumber_on_withdraw = config.renumber_on_withdraw;

        let (removed, mut renumbered, deferred) = self
            .with_retries(&config, "withdraw", || async move {
                let entry = self.load_entry(entry_id).await?;
                let (removal, deferred) = if renumber_on_withdraw && entry.is_pending() {
                    let queue = self
                        .repository
                        .load_station_queue(&entry.station_user_id)
                        .await?;
                    let (renumbered, deferred) =
                        inline_renumbering(renumber(&queue.without(entry_id)));
                    let removal = EntryRemoval {
                        entry_id,
                        station_user_id: entry.station_user_id.clone(),
                        renumbered,
                        expected_version: Some(queue.version),
                    };
                    (removal, deferred)
                } else {
                    let removal = EntryRemoval {
                        entry_id,
                        station_user_id: entry.station_user_id.clone(),
                        renumbered: Vec::new(),
                        expected_version: None,
                    };
                    (removal, false)
                };

                let removed = self
                    .repository
                    .remove_entry(&removal)
                    .await
                    .map_err(entry_error(entry_id))?;
                Ok::<_, QueueServiceError>((removed, !removal.renumbered.is_empty(), deferred))
            })
            .await?;

        info!(
            "Car {} withdrew entry {} from {}",
            removed.car_user_id, removed.id, removed.station_user_id
        );
        if deferred {
            renumbered |= self
                .compact_after_commit(&config, &removed.station_user_id)
                .await
                > 0;
        }
        self.changes.publish(ChangeEvent::entry(
            removed.id,
            &removed.station_user_id,
            ChangeKind::Deleted,
        ));
        if renumbered {
            self.changes
                .publish(ChangeEvent::renumbered(&removed.station_user_id));
        }
        Ok(removed)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> Result<QueueEntry, QueueServiceError> {
        self.load_entry(entry_id).await
    }

    /// Active entries at a station: serving ones first in the order they
    /// started, then pending ones in serve order.
    pub async fn list_active_for_station(
        &self,
        station_user_id: &str,
    ) -> Result<Vec<QueueEntry>, QueueServiceError> {
        let entries = self
            .repository
            .list_station_entries(station_user_id, &QueueStatus::ACTIVE)
            .await?;

        let (mut serving, mut pending): (Vec<QueueEntry>, Vec<QueueEntry>) =
            entries.into_iter().partition(|entry| !entry.is_pending());
        serving.sort_by_key(|entry| (entry.started_at, entry.created_at));
        sort_by_serve_order(&mut pending);
        serving.extend(pending);
        Ok(serving)
    }

    /// Active entries of a car, newest first, each with its place in line.
    pub async fn list_active_for_car(
        &self,
        car_user_id: &str,
    ) -> Result<Vec<CarQueueEntry>, QueueServiceError> {
        let mut entries = self
            .repository
            .list_car_entries(car_user_id, &QueueStatus::ACTIVE)
            .await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let ahead = self.compute_cars_ahead(&entry).await?;
            let rank = if entry.is_pending() { ahead + 1 } else { 0 };
            result.push(CarQueueEntry {
                entry,
                cars_ahead: ahead,
                rank,
            });
        }
        Ok(result)
    }

    /// Pending entries at the same station served before `entry`.
    pub async fn compute_cars_ahead(&self, entry: &QueueEntry) -> Result<usize, QueueServiceError> {
        if !entry.is_pending() {
            return Ok(0);
        }
        let queue = self
            .repository
            .load_station_queue(&entry.station_user_id)
            .await?;
        Ok(cars_ahead(entry, &queue.pending))
    }

    /// Renumbers in chunks of at most `POSITION_CHUNK` updates. Each chunk is
    /// checked against the version the previous one left, and serve order
    /// holds between chunks.
    async fn compact(
        &self,
        config: &CoordinatorConfig,
        station_user_id: &str,
    ) -> Result<usize, QueueServiceError> {
        let mut moved = 0;
        loop {
            let chunk = self
                .with_retries(config, "renumber", || async move {
                    let queue = self.repository.load_station_queue(station_user_id).await?;
                    let updates: Vec<PositionUpdate> = renumber(&queue.pending)
                        .into_iter()
                        .take(POSITION_CHUNK)
                        .collect();
                    if updates.is_empty() {
                        return Ok::<_, QueueServiceError>(0);
                    }
                    self.repository
                        .apply_positions(station_user_id, &updates, queue.version)
                        .await?;
                    Ok(updates.len())
                })
                .await?;
            if chunk == 0 {
                return Ok(moved);
            }
            moved += chunk;
        }
    }

    /// Follow-up compaction for a commit that left a gap. The commit stands
    /// either way; a failure leaves a gap that ranks ignore and
    /// `renumber_pending` closes.
    async fn compact_after_commit(
        &self,
        config: &CoordinatorConfig,
        station_user_id: &str,
    ) -> usize {
        match self.compact(config, station_user_id).await {
            Ok(moved) => moved,
            Err(err) => {
                warn!(
                    "Left a position gap at {} after commit: {}",
                    station_user_id, err
                );
                0
            }
        }
    }

    async fn load_entry(&self, entry_id: Uuid) -> Result<QueueEntry, QueueServiceError> {
        self.repository
            .get_entry(entry_id)
            .await
            .map_err(entry_error(entry_id))
    }

    /// Runs `attempt` until it succeeds, fails with something other than a
    /// store conflict, or runs out of attempts.
    async fn with_retries<T, F, Fut>(
        &self,
        config: &CoordinatorConfig,
        operation: &str,
        mut attempt: F,
    ) -> Result<T, QueueServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueueServiceError>>,
    {
        let max_attempts = config.max_commit_attempts.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(QueueServiceError::StoreFailure(err))
                    if err.is_conflict() && tries < max_attempts =>
                {
                    warn!(
                        "{} hit a conflict on attempt {}/{}: {}",
                        operation, tries, max_attempts, err
                    );
                    tokio::time::sleep(backoff(config.retry_base_delay, tries)).await;
                }
                result => return result,
            }
        }
    }
}

/// Splits off renumbering that would not fit in one transaction with the
/// entry write and the version bump. Returns the updates to commit inline
/// and whether compaction has to follow the commit.
fn inline_renumbering(updates: Vec<PositionUpdate>) -> (Vec<PositionUpdate>, bool) {
    if updates.len() + 2 > MAX_TRANSACTION_ITEMS {
        (Vec::new(), true)
    } else {
        (updates, false)
    }
}

fn positive_amount(amount: Option<f64>) -> Result<f64, QueueServiceError> {
    match amount {
        Some(value) if value.is_finite() && value > 0.0 => Ok(value),
        other => Err(QueueServiceError::InvalidAmount(other)),
    }
}

/// Linear backoff with up to one base delay of jitter.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let jitter = rand::thread_rng().gen_range(0..=base_ms);
    Duration::from_millis(base_ms * attempt as u64 + jitter)
}

fn entry_error(entry_id: Uuid) -> impl Fn(QueueRepositoryError) -> QueueServiceError {
    move |err| match err {
        QueueRepositoryError::NotFound => QueueServiceError::NotFound(entry_id),
        other => QueueServiceError::StoreFailure(other),
    }
}
