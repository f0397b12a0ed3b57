//! Decorator-style attachment of a breaker to an arbitrary operation.

use std::future::Future;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::error::{BreakerError, Fault};
use crate::registry;

/// Binds a [`CircuitBreaker`] to arbitrary operations for ergonomic
/// reuse inside a backend adapter.
///
/// The wrapper owns (a handle to) the breaker and exposes both the
/// guarded call and the breaker itself, so tests and dashboards can
/// inspect the state machine behind an adapter.
///
/// ```
/// use ballast_breaker::{Fault, Guarded};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("daemon unreachable")]
/// struct DaemonError;
/// impl Fault for DaemonError {}
///
/// # tokio_test::block_on(async {
/// let guarded = Guarded::for_backend("ipfs");
/// let pinned = guarded
///     .call(|| async { Ok::<_, DaemonError>("bafy...") })
///     .await;
/// assert!(pinned.is_ok());
/// assert!(guarded.breaker().state().to_string() == "closed");
/// # });
/// ```
#[derive(Clone)]
pub struct Guarded {
    breaker: Arc<CircuitBreaker>,
}

impl Guarded {
    /// Wrap an existing breaker.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// Wrap the process-wide default registry's breaker for `backend`.
    #[must_use]
    pub fn for_backend(backend: &str) -> Self {
        Self::new(registry().get_or_create(backend))
    }

    /// Execute `operation` through the owned breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        E: Fault,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker.call(operation).await
    }

    /// The underlying breaker, for inspection.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl std::fmt::Debug for Guarded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Guarded").field(&self.breaker).finish()
    }
}
