use std::sync::Arc;

use shared::config::ConfigHandle;
use shared::repositories::queue_repository::QueueRepository;
use shared::services::change_bus::ChangeBus;
use shared::services::queue_coordinator::QueueCoordinator;
use shared::services::station_stats_service::StationStatsService;

use crate::services::auth_service::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub coordinator: Arc<QueueCoordinator>,
    pub stats_service: Arc<StationStatsService>,
}

impl AppState {
    /// Wires both services onto one store and one configuration handle.
    pub fn new(
        repository: Arc<dyn QueueRepository + Send + Sync>,
        config: ConfigHandle,
        auth_service: AuthService,
    ) -> Self {
        let coordinator =
            QueueCoordinator::new(repository.clone(), config.clone(), ChangeBus::default());
        let stats_service = StationStatsService::new(repository, config);
        AppState {
            auth_service: Arc::new(auth_service),
            coordinator: Arc::new(coordinator),
            stats_service: Arc::new(stats_service),
        }
    }
}
