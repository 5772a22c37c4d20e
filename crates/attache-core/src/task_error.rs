//! Background task failures.
//!
//! A task failure is either retried by the queue or, when marked unrecoverable, fails the task
//! immediately.

use std::fmt;

use crate::error::{AppError, ErrorMetadata};

#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// Fail the task without retrying (e.g. the record it refers to no longer exists).
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Retry the task according to the queue's retry policy.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// True unless `err` wraps a [`TaskError`] marked unrecoverable.
    pub fn is_retryable(err: &anyhow::Error) -> bool {
        err.downcast_ref::<TaskError>()
            .map(TaskError::is_recoverable)
            .unwrap_or(true)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Recoverability follows the error's metadata; version conflicts and infrastructure failures
/// are retried, domain and input errors are not.
impl From<AppError> for TaskError {
    fn from(err: AppError) -> Self {
        let recoverable = err.is_recoverable();
        Self {
            inner: anyhow::Error::new(err),
            recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_error() {
        let err = TaskError::unrecoverable(anyhow::anyhow!("record gone"));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("record gone"));
    }

    #[test]
    fn test_from_anyhow_is_recoverable() {
        let err: TaskError = anyhow::anyhow!("Some error").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_app_error_follows_metadata() {
        let conflict: TaskError = AppError::VersionConflict("a".to_string()).into();
        assert!(conflict.is_recoverable());
        let missing: TaskError = AppError::NotFound("a".to_string()).into();
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn test_is_retryable_through_anyhow() {
        let err: anyhow::Error = TaskError::unrecoverable(anyhow::anyhow!("bad")).into();
        assert!(!TaskError::is_retryable(&err));
        assert!(TaskError::is_retryable(&anyhow::anyhow!("generic error")));
    }
}
