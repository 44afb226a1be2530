use std::fmt;
use uuid::Uuid;

use crate::models::queue::{QueueAction, QueueStatus};
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;

#[derive(Debug)]
pub enum QueueServiceError {
    ValidationError(String),
    /// `None` when the amount was missing altogether.
    InvalidAmount(Option<f64>),
    InvalidTransition {
        action: QueueAction,
        status: QueueStatus,
    },
    NotFound(Uuid),
    StoreFailure(QueueRepositoryError),
}

impl QueueServiceError {
    /// Stable identifier for clients; the `Display` text is for humans.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueServiceError::ValidationError(_) => "validation_error",
            QueueServiceError::InvalidAmount(_) => "invalid_amount",
            QueueServiceError::InvalidTransition { .. } => "invalid_transition",
            QueueServiceError::NotFound(_) => "not_found",
            QueueServiceError::StoreFailure(_) => "store_failure",
        }
    }
}

impl fmt::Display for QueueServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            QueueServiceError::InvalidAmount(Some(amount)) => {
                write!(f, "Amount must be a positive number of liters, got {}", amount)
            }
            QueueServiceError::InvalidAmount(None) => write!(f, "Amount is required"),
            QueueServiceError::InvalidTransition { action, status } => {
                write!(f, "Cannot {} an entry that is {}", action, status)
            }
            QueueServiceError::NotFound(id) => write!(f, "Queue entry {} not found", id),
            QueueServiceError::StoreFailure(err) => write!(f, "Store failure: {}", err),
        }
    }
}

impl std::error::Error for QueueServiceError {}

impl From<QueueRepositoryError> for QueueServiceError {
    fn from(err: QueueRepositoryError) -> Self {
        QueueServiceError::StoreFailure(err)
    }
}
