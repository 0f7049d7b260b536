use crate::context::Cause;
use crate::resilience::circuit_breaker::BreakerError;
use crate::{Error, Result};

pub const SUCCESS: &str = "success";
pub const REJECT: &str = "reject";
pub const FAIL: &str = "fail";
pub const PANIC: &str = "panic";
pub const CONTEXT_DEADLINE_EXCEEDED: &str = "context-deadline-exceeded";
pub const CONTEXT_CANCELED: &str = "context-canceled";
pub const TOO_MANY_REQUESTS: &str = "too-many-requests";
pub const CIRCUIT_OPEN: &str = "circuit-open";
pub const FALLBACK_SUCCESS: &str = "fallback-success";
pub const FALLBACK_FAILURE: &str = "fallback-failure";

/// How a command ended. Drives both the metric label and the caller-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Rejected(BreakerError),
    Failed,
    Panicked,
    Cancelled,
    TimedOut,
    FallbackSucceeded,
    FallbackFailed,
}

impl Outcome {
    /// Metric label recorded for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => SUCCESS,
            Outcome::Rejected(BreakerError::Open) => CIRCUIT_OPEN,
            Outcome::Rejected(BreakerError::TooManyRequests) => TOO_MANY_REQUESTS,
            Outcome::Failed => FAIL,
            Outcome::Panicked => PANIC,
            Outcome::Cancelled => CONTEXT_CANCELED,
            Outcome::TimedOut => CONTEXT_DEADLINE_EXCEEDED,
            Outcome::FallbackSucceeded => FALLBACK_SUCCESS,
            Outcome::FallbackFailed => FALLBACK_FAILURE,
        }
    }

    /// Coarse label: `reject` for either rejection cause, otherwise [`Outcome::label`].
    pub fn category(&self) -> &'static str {
        match self {
            Outcome::Rejected(_) => REJECT,
            other => other.label(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::FallbackSucceeded)
    }

    /// Classify a visible command result. Errors that are not produced by the
    /// executor itself count as ordinary failures.
    pub fn of(result: &Result<()>) -> Outcome {
        match result {
            Ok(()) => Outcome::Success,
            Err(Error::Rejected(reason)) => Outcome::Rejected(*reason),
            Err(Error::Cancelled) => Outcome::Cancelled,
            Err(Error::DeadlineExceeded) => Outcome::TimedOut,
            Err(Error::Panicked { .. }) => Outcome::Panicked,
            Err(_) => Outcome::Failed,
        }
    }
}

impl From<Cause> for Outcome {
    fn from(cause: Cause) -> Self {
        match cause {
            Cause::Canceled => Outcome::Cancelled,
            Cause::DeadlineExceeded => Outcome::TimedOut,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Label for a visible command result.
///
/// This classifies the error the caller sees, which is not always the label the
/// executor recorded: work that returns `Error::DeadlineExceeded` itself is counted
/// as `fail`, yet its visible result maps to `context-deadline-exceeded` here.
pub fn outcome_label(result: &Result<()>) -> &'static str {
    Outcome::of(result).label()
}
