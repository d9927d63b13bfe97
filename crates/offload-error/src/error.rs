//! Error types surfaced by the engine.
//!
//! Two families exist, matching the distinction between
//! submission-time failures and execution-time failures:
//!
//! - [`EngineError`] — synchronous configuration/lifecycle errors, returned
//!   directly by API calls like `submit` or `start_workers`.
//! - [`WorkError`] / [`CancelledError`] — surfaced on the future a submission
//!   returns. `CancelledError` is a subtype of `WorkError`: every cancelled
//!   error converts into a work error, but not every work error was a
//!   cancellation.

use crate::status_code::StatusCode;

/// A synchronous error returned directly by a fallible API call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("start_workers called more than once")]
    AlreadyStarted,

    #[error("the pool has not been started")]
    NotStarted,

    #[error("stop() has already been called")]
    Stopped,

    #[error("the engine is in a no-go state")]
    NoGo,

    #[error("no healthy worker pool and fail-open is disabled")]
    BrokenPool,

    #[error("registration attempted after start_workers: {0}")]
    RegisteredAfterStart(String),

    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("notification kind {0} collides with a built-in kind")]
    NonDisjointNotificationKind(i32),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl EngineError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyStarted => StatusCode::AlreadyStarted,
            Self::NotStarted => StatusCode::NotStarted,
            Self::Stopped => StatusCode::Stopped,
            Self::NoGo => StatusCode::NoGo,
            Self::BrokenPool => StatusCode::BrokenPool,
            Self::RegisteredAfterStart(_) => StatusCode::RegisteredAfterStart,
            Self::DuplicateRegistration(_) => StatusCode::DuplicateRegistration,
            Self::NonDisjointNotificationKind(_) => StatusCode::NonDisjointNotificationKind,
            Self::InvalidArguments(_) => StatusCode::InvalidArguments,
        }
    }
}

/// An error surfaced on a submission's future.
///
/// Carries only a diagnostic message: the original exception/panic inside a
/// worker process is never marshalled back across the process boundary, per
/// this engine's error-handling design.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct WorkError {
    pub message: String,
    pub status_code: StatusCode,
}

impl WorkError {
    pub fn new(message: impl Into<String>, status_code: StatusCode) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::Internal)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status_code == StatusCode::Cancelled
    }
}

/// Cooperative cancellation, surfaced whenever cancellation wins the race
/// with completion.
#[derive(Debug, Clone, thiserror::Error)]
#[error("operation was cancelled")]
pub struct CancelledError;

impl From<CancelledError> for WorkError {
    fn from(_: CancelledError) -> Self {
        WorkError::new("operation was cancelled", StatusCode::Cancelled)
    }
}

pub type WorkResult<T> = std::result::Result<T, WorkError>;
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_converts_to_work_error_with_cancelled_status() {
        let work_err: WorkError = CancelledError.into();
        assert!(work_err.is_cancelled());
        assert_eq!(work_err.status_code, StatusCode::Cancelled);
    }

    #[test]
    fn engine_error_status_codes_match_variants() {
        assert_eq!(
            EngineError::AlreadyStarted.status_code(),
            StatusCode::AlreadyStarted
        );
        assert_eq!(
            EngineError::InvalidArguments("x".into()).status_code(),
            StatusCode::InvalidArguments
        );
    }

    #[test]
    fn internal_work_error_is_not_cancelled() {
        let err = WorkError::internal("boom");
        assert!(!err.is_cancelled());
    }
}
