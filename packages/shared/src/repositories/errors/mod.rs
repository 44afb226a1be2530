pub mod queue_repository_errors;
