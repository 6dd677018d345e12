//! Error taxonomy for the subscriber.
//!
//! Startup errors (`Config`, `StageBind`, `QueueAddress`) are fatal and end
//! the process before any message is consumed. Runtime errors (`Dequeue`,
//! `StageExecution`) are contained to the dequeue loop iteration or the
//! message task that raised them.

use thiserror::Error;

pub type TaskqResult<T> = Result<T, TaskqError>;

#[derive(Debug, Error)]
pub enum TaskqError {
    /// Configuration source unreadable, malformed or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A declared stage could not be bound to an implementation.
    #[error("failed to bind stage '{stage}': {reason}")]
    StageBind { stage: String, reason: String },

    /// Queue endpoint could not be resolved.
    #[error("invalid queue address: {0}")]
    QueueAddress(String),

    /// Transient failure while popping from the queue.
    #[error("dequeue failed: {0}")]
    Dequeue(String),

    /// The queue will never yield another message.
    #[error("queue closed")]
    QueueClosed,

    /// Raised by a stage transform for a payload it cannot handle.
    #[error("{0}")]
    Stage(String),

    /// A stage failed for one message; carries the stage identity.
    #[error("stage '{stage}' failed: {reason}")]
    StageExecution { stage: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskqError {
    /// Whether the error can only happen before consumption starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskqError::Config(_) | TaskqError::StageBind { .. } | TaskqError::QueueAddress(_)
        )
    }

    pub fn stage_bind(stage: impl Into<String>, reason: impl ToString) -> Self {
        TaskqError::StageBind {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }
}
