pub mod change_bus;
pub mod errors;
pub mod queue_coordinator;
pub mod station_stats_service;
