//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by pool construction and registry lookups.
///
/// Exhaustion is deliberately not an error: `acquire` returns `None` when the
/// deadline passes so callers can degrade without exception plumbing.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool configuration is internally inconsistent.
    #[error("invalid pool configuration: {message}")]
    InvalidConfig { message: String },

    /// A registry entry with this name exists but holds a pool of a
    /// different connection type.
    #[error("pool '{backend}' is registered with a different connection type")]
    TypeMismatch { backend: String },
}

impl PoolError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn type_mismatch(backend: impl Into<String>) -> Self {
        Self::TypeMismatch {
            backend: backend.into(),
        }
    }
}

/// Failure reported by a [`Connector`](crate::Connector) when opening a
/// connection.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConnectError {
    message: String,
    /// Hint for callers that want to back off longer than the pool's own
    /// retry pause.
    retry_after: Option<Duration>,
}

impl ConnectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
