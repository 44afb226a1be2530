pub mod errors;
pub mod memory_queue_repository;
pub mod queue_repository;
