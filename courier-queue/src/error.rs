//! Error types for queue operations.

use crate::task::{TaskId, TaskState};
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store failure other than a Redis protocol error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// No handler registered for task type
    #[error("No handler registered for task type: {0}")]
    UnknownTaskType(String),

    /// Operation not allowed in the task's current state
    #[error("Task {id} is {state:?}; cannot {action}")]
    InvalidState {
        id: TaskId,
        state: TaskState,
        action: &'static str,
    },

    /// Unknown priority class name
    #[error("Unknown queue class: {0}")]
    UnknownClass(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Whether the error came from the backing store.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            QueueError::Redis(_)
                | QueueError::Persistence(_)
                | QueueError::Serialization(_)
                | QueueError::Deserialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_invalid_state_display() {
        let id = Uuid::nil();
        let err = QueueError::InvalidState {
            id,
            state: TaskState::Processing,
            action: "cancel",
        };
        let display = err.to_string();
        assert!(display.contains("Processing"));
        assert!(display.contains("cancel"));
    }

    #[test]
    fn test_persistence_classification() {
        assert!(QueueError::Persistence("down".into()).is_persistence());
        assert!(!QueueError::UnknownTaskType("x".into()).is_persistence());
    }
}
