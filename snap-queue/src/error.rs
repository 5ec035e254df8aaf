use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Queue is closed")]
    Closed,
}

/// Code used when a processor fails without naming a more specific one
pub const DEFAULT_ERROR_CODE: &str = "JOB_FAILED";

/// Code recorded when a processor panics instead of returning an error
pub const PANIC_ERROR_CODE: &str = "PROCESSOR_PANIC";

/// Failure of a single attempt.
///
/// Every attempt failure is retried until the job runs out of attempts; the
/// code only travels to the caller (status API, failure callback).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    /// Create an error with an explicit machine-readable code
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an error with the default code
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(DEFAULT_ERROR_CODE, message)
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "processor panicked".to_string()
        };
        Self::new(PANIC_ERROR_CODE, message)
    }
}

/// Errors raised by the webhook sender.
///
/// Giving up after exhausting retries is not one of them: `send` returns
/// `Ok(false)` in that case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// Endpoint answered with a non-retryable status
    #[error("Callback failed with status {status}")]
    Rejected { status: u16 },

    #[error("Callback client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for CallbackError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client(err.to_string())
    }
}

/// Errors raised by a rate-limit backend.
///
/// Callers fail open on these: a broken limiter never blocks intake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit backend unavailable: {0}")]
    Unavailable(String),
}
