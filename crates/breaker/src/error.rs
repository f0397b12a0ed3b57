//! Error types and failure classification for breaker-guarded calls.

use std::time::Duration;

use thiserror::Error;

/// Classifies an operation error as seen by a circuit breaker.
///
/// Backend-communication failures (connection refused, timeout, 5xx,
/// daemon gone) should report `true` and count toward tripping the
/// circuit. Validation and programmer errors should report `false`;
/// the breaker re-raises them untouched, so a local bug can never
/// falsely indict a healthy backend.
///
/// The blanket default is `true`: an error type that opts out of
/// nothing is treated as a dependency fault.
pub trait Fault {
    /// Whether this error indicts the remote dependency.
    fn is_dependency_fault(&self) -> bool {
        true
    }
}

/// Error returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open and not yet eligible to probe.
    ///
    /// The operation was never invoked. `retry_after` is the remaining
    /// cooldown before the next call may probe the backend.
    #[error("circuit breaker for '{backend}' is open (retry after {retry_after:?})")]
    Open {
        /// Name of the backend whose circuit rejected the call.
        backend: String,
        /// Time until the breaker becomes eligible to probe.
        retry_after: Duration,
    },

    /// The operation ran and failed with its own error.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether this is a fast failure (the operation never ran).
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Take back the operation's own error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}

/// Invalid breaker configuration.
#[derive(Debug, Error)]
#[error("invalid circuit breaker configuration: {message}")]
pub struct ConfigError {
    pub(crate) message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
