#[derive(Debug)]
pub enum QueueRepositoryError {
    NotFound,
    /// The station's pending set changed since it was read.
    VersionConflict,
    /// The entry no longer has the status the write was based on.
    StatusConflict,
    BatchTooLarge(usize),
    Serialization(String),
    DynamoDb(String),
}

impl QueueRepositoryError {
    /// Conflicts are resolved by re-reading and trying again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            QueueRepositoryError::VersionConflict | QueueRepositoryError::StatusConflict
        )
    }
}

impl std::fmt::Display for QueueRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueRepositoryError::NotFound => write!(f, "Queue entry not found"),
            QueueRepositoryError::VersionConflict => {
                write!(f, "Station queue was modified concurrently")
            }
            QueueRepositoryError::StatusConflict => {
                write!(f, "Queue entry status was modified concurrently")
            }
            QueueRepositoryError::BatchTooLarge(size) => {
                write!(f, "Batch of {} writes exceeds the transaction limit", size)
            }
            QueueRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            QueueRepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for QueueRepositoryError {}
