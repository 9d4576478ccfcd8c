use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core task-router errors.
///
/// Ordinary handler failures are not represented here: they terminate the
/// task with a `Failed` status and an [`crate::types::ErrorDescriptor`]
/// instead of escaping as errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Failure value returned by a domain handler invocation.
///
/// The controller converts this into a terminal `Failed` task state; it is
/// deliberately opaque beyond its message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
