use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use crate::config::ConfigHandle;
use crate::models::queue::responses::{QueueSummary, StationHistory, StationStats};
use crate::models::queue::{QueueEntry, QueueStatus};
use crate::repositories::queue_repository::QueueRepository;
use crate::services::errors::queue_service_errors::QueueServiceError;

/// Read-only aggregates over a station's entries.
#[derive(Clone)]
pub struct StationStatsService {
    repository: Arc<dyn QueueRepository + Send + Sync>,
    config: ConfigHandle,
}

impl StationStatsService {
    pub fn new(repository: Arc<dyn QueueRepository + Send + Sync>, config: ConfigHandle) -> Self {
        StationStatsService { repository, config }
    }

    /// The current date in the station's configured offset.
    pub fn today(&self) -> NaiveDate {
        Utc::now()
            .with_timezone(&self.config.current().station_utc_offset)
            .date_naive()
    }

    /// Live counts plus the entries completed during `date`, where `date` is
    /// a station-local calendar day.
    pub async fn daily_stats(
        &self,
        station_user_id: &str,
        date: NaiveDate,
    ) -> Result<StationStats, QueueServiceError> {
        require_station(station_user_id)?;
        let (from, to) = day_bounds(date, self.config.current().station_utc_offset);

        let pending_count = self
            .repository
            .count_station_entries(station_user_id, QueueStatus::Pending)
            .await?;
        let serving_count = self
            .repository
            .count_station_entries(station_user_id, QueueStatus::Serving)
            .await?;
        let completed: Vec<QueueEntry> = self
            .repository
            .list_station_entries(station_user_id, &[QueueStatus::Completed])
            .await?
            .into_iter()
            .filter(|entry| {
                entry
                    .completed_at
                    .map_or(false, |completed_at| completed_at >= from && completed_at < to)
            })
            .collect();

        debug!(
            "{} completed {} entries on {}",
            station_user_id,
            completed.len(),
            date
        );
        Ok(StationStats {
            pending_count,
            serving_count,
            completed_today_count: completed.len(),
            fuel_sold_today: total_served(&completed),
        })
    }

    /// Completed entries, most recent first. `count` and `total_fuel` cover
    /// the whole history even when `limit` trims the list.
    pub async fn completed_history(
        &self,
        station_user_id: &str,
        limit: Option<usize>,
    ) -> Result<StationHistory, QueueServiceError> {
        require_station(station_user_id)?;
        let mut entries = self
            .repository
            .list_station_entries(station_user_id, &[QueueStatus::Completed])
            .await?;
        entries.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let count = entries.len();
        let total_fuel = total_served(&entries);
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(StationHistory {
            entries,
            count,
            total_fuel,
        })
    }

    /// Public view of a station's line for cars choosing where to queue.
    pub async fn queue_summary(
        &self,
        station_user_id: &str,
    ) -> Result<QueueSummary, QueueServiceError> {
        require_station(station_user_id)?;
        let pending_count = self
            .repository
            .count_station_entries(station_user_id, QueueStatus::Pending)
            .await?;
        let serving_count = self
            .repository
            .count_station_entries(station_user_id, QueueStatus::Serving)
            .await?;
        let active_count = pending_count + serving_count;

        Ok(QueueSummary {
            station_user_id: station_user_id.to_string(),
            active_count,
            pending_count,
            estimated_wait_minutes: u32::try_from(active_count)
                .unwrap_or(u32::MAX)
                .saturating_mul(self.config.current().minutes_per_car),
        })
    }
}

fn require_station(station_user_id: &str) -> Result<(), QueueServiceError> {
    if station_user_id.trim().is_empty() {
        return Err(QueueServiceError::ValidationError(
            "Station cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// `[start, end)` of a station-local day in UTC.
fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = date.and_time(NaiveTime::MIN);
    let start = (local_midnight - Duration::seconds(offset.local_minus_utc() as i64)).and_utc();
    (start, start + Duration::days(1))
}

fn total_served(entries: &[QueueEntry]) -> f64 {
    let total: f64 = entries.iter().filter_map(|entry| entry.served_amount).sum();
    (total * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::models::queue::{FuelType, QueueAction};
    use crate::repositories::memory_queue_repository::InMemoryQueueRepository;
    use crate::repositories::queue_repository::MockQueueRepository;
    use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;
    use chrono::TimeZone;
    use test_case::test_case;

    const STATION: &str = "station-1";

    /// Stores an entry that completed at `completed_at`.
    async fn completed(
        repository: &InMemoryQueueRepository,
        served: f64,
        completed_at: DateTime<Utc>,
    ) -> QueueEntry {
        let queue = repository.load_station_queue(STATION).await.unwrap();
        let mut entry = QueueEntry::new("car", STATION, FuelType::Diesel, served, 1)
            .advanced(QueueAction::Start, None, completed_at)
            .advanced(QueueAction::Complete, Some(served), completed_at);
        // Backdate; `advanced` never moves timestamps before creation.
        entry.created_at = completed_at;
        entry.started_at = Some(completed_at);
        entry.completed_at = Some(completed_at);
        repository.insert_entry(&entry, queue.version).await.unwrap();
        entry
    }

    async fn pending(repository: &InMemoryQueueRepository, position: u32) {
        let queue = repository.load_station_queue(STATION).await.unwrap();
        let entry = QueueEntry::new("car", STATION, FuelType::Benzene, 30.0, position);
        repository.insert_entry(&entry, queue.version).await.unwrap();
    }

    fn service_with(
        repository: Arc<dyn QueueRepository + Send + Sync>,
        offset_hours: i32,
    ) -> StationStatsService {
        let config = CoordinatorConfig {
            station_utc_offset: FixedOffset::east_opt(offset_hours * 3600).unwrap(),
            ..CoordinatorConfig::default()
        };
        StationStatsService::new(repository, ConfigHandle::new(config))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_daily_stats_for_station_with_one_completion() {
        let repository = Arc::new(InMemoryQueueRepository::new());
        pending(&repository, 1).await;
        completed(
            &repository,
            15.5,
            Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap(),
        )
        .await;
        let service = service_with(repository, 0);

        let stats = service.daily_stats(STATION, date(2024, 5, 10)).await.unwrap();

        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.serving_count, 0);
        assert_eq!(stats.completed_today_count, 1);
        assert_eq!(stats.fuel_sold_today, 15.5);
    }

    #[tokio::test]
    async fn test_daily_stats_with_no_activity_is_all_zero() {
        let service = service_with(Arc::new(InMemoryQueueRepository::new()), 0);

        let stats = service.daily_stats(STATION, date(2024, 5, 10)).await.unwrap();

        assert_eq!(stats, StationStats::default());
    }

    #[test_case(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap(), true ; "local midnight")]
    #[test_case(Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap(), true ; "last second")]
    #[test_case(
        Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap() + Duration::milliseconds(500),
        true ;
        "inside the last second"
    )]
    #[test_case(Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap(), false ; "next midnight")]
    #[tokio::test]
    async fn test_day_boundaries(completed_at: DateTime<Utc>, counted: bool) {
        let repository = Arc::new(InMemoryQueueRepository::new());
        completed(&repository, 10.0, completed_at).await;
        let service = service_with(repository, 0);

        let stats = service.daily_stats(STATION, date(2024, 5, 10)).await.unwrap();

        assert_eq!(stats.completed_today_count, usize::from(counted));
    }

    #[tokio::test]
    async fn test_daily_stats_use_station_local_day() {
        let repository = Arc::new(InMemoryQueueRepository::new());
        // 22:30 UTC on the 9th is 01:30 on the 10th at UTC+3.
        completed(
            &repository,
            20.0,
            Utc.with_ymd_and_hms(2024, 5, 9, 22, 30, 0).unwrap(),
        )
        .await;
        let service = service_with(repository, 3);

        let on_tenth = service.daily_stats(STATION, date(2024, 5, 10)).await.unwrap();
        let on_ninth = service.daily_stats(STATION, date(2024, 5, 9)).await.unwrap();

        assert_eq!(on_tenth.completed_today_count, 1);
        assert_eq!(on_ninth.completed_today_count, 0);
    }

    #[tokio::test]
    async fn test_fuel_sold_is_rounded_to_cents() {
        let repository = Arc::new(InMemoryQueueRepository::new());
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        for served in [1.111, 2.222] {
            completed(&repository, served, at).await;
        }
        let service = service_with(repository, 0);

        let stats = service.daily_stats(STATION, date(2024, 5, 10)).await.unwrap();

        assert_eq!(stats.completed_today_count, 2);
        assert_eq!(stats.fuel_sold_today, 3.33);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_with_full_totals() {
        let repository = Arc::new(InMemoryQueueRepository::new());
        let first = completed(
            &repository,
            10.0,
            Utc.with_ymd_and_hms(2024, 5, 8, 8, 0, 0).unwrap(),
        )
        .await;
        let latest = completed(
            &repository,
            5.25,
            Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap(),
        )
        .await;
        pending(&repository, 1).await;
        let service = service_with(repository, 0);

        let history = service.completed_history(STATION, Some(1)).await.unwrap();

        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].id, latest.id);
        assert_eq!(history.count, 2);
        assert_eq!(history.total_fuel, 15.25);

        let history = service.completed_history(STATION, None).await.unwrap();
        assert_eq!(history.entries[1].id, first.id);
    }

    #[tokio::test]
    async fn test_queue_summary_estimates_wait() {
        let repository = Arc::new(InMemoryQueueRepository::new());
        pending(&repository, 1).await;
        pending(&repository, 2).await;
        let service = service_with(repository, 0);

        let summary = service.queue_summary(STATION).await.unwrap();

        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.pending_count, 2);
        assert_eq!(summary.estimated_wait_minutes, 10);
    }

    #[tokio::test]
    async fn test_queue_summary_wait_saturates() {
        let mut repository = MockQueueRepository::new();
        repository
            .expect_count_station_entries()
            .returning(|_, status| match status {
                QueueStatus::Pending => Ok(u32::MAX as usize + 1),
                _ => Ok(0),
            });
        let service = service_with(Arc::new(repository), 0);

        let summary = service.queue_summary(STATION).await.unwrap();

        assert_eq!(summary.estimated_wait_minutes, u32::MAX);
    }

    #[tokio::test]
    async fn test_empty_station_is_rejected_before_store_call() {
        let service = service_with(Arc::new(MockQueueRepository::new()), 0);

        let result = service.daily_stats("", date(2024, 5, 10)).await;

        assert!(matches!(result, Err(QueueServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut repository = MockQueueRepository::new();
        repository
            .expect_count_station_entries()
            .returning(|_, _| Err(QueueRepositoryError::DynamoDb("unavailable".to_string())));
        let service = service_with(Arc::new(repository), 0);

        let result = service.queue_summary(STATION).await;

        assert!(matches!(result, Err(QueueServiceError::StoreFailure(_))));
    }

    #[test]
    fn test_day_bounds_span_one_local_day() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();

        let (start, end) = day_bounds(date(2024, 3, 1), offset);

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }
}
