//! Error types raised by the lifecycle tracker.
//!
//! Only input problems are errors. Operations that are structurally
//! inapplicable in the current state (updating a finished task, approving
//! an unfinished one) return an ordinary response with a status instead.

use thiserror::Error;

/// Failure raised synchronously to the caller of a tracker operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Referenced request id does not exist.
    #[error("Request ID {request_id} not found")]
    RequestNotFound { request_id: String },

    /// Referenced task id does not exist.
    #[error("Task ID {task_id} not found")]
    TaskNotFound { task_id: String },

    /// Referenced subtask id does not exist.
    #[error("Subtask ID {subtask_id} not found")]
    SubtaskNotFound { subtask_id: String },

    /// Malformed input.
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl TrackerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this is one of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RequestNotFound { .. } | Self::TaskNotFound { .. } | Self::SubtaskNotFound { .. }
        )
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
