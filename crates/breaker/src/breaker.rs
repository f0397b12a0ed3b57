//! Per-backend circuit breaker state machine.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{BreakerError, ConfigError, Fault};

/// Operating state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Backend assumed down, calls fail fast.
    Open,
    /// Probing state reached only from open, after the cooldown.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Mutable breaker state. Every field is guarded by the one lock in
/// [`CircuitBreaker`]; the lock is only ever held for bookkeeping,
/// never across the wrapped operation.
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    /// Consecutive successes; meaningful only while half-open.
    success_count: u32,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    total_timeouts: u64,
    total_circuit_opens: u64,
    last_failure_time: Option<Instant>,
    opened_at: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            total_timeouts: 0,
            total_circuit_opens: 0,
            last_failure_time: None,
            opened_at: None,
        }
    }
}

/// Read-only snapshot of one breaker, as returned by
/// [`CircuitBreaker::snapshot`].
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    /// Backend name this breaker guards.
    pub name: String,
    /// Current operating state.
    pub state: CircuitState,
    /// Accumulated failure count (decays on closed-state successes).
    pub failure_count: u32,
    /// Consecutive half-open successes.
    pub success_count: u32,
    /// Lifetime requests, including fast-failed ones.
    pub total_requests: u64,
    /// Lifetime successful operations.
    pub total_successes: u64,
    /// Lifetime dependency-fault failures.
    pub total_failures: u64,
    /// Lifetime fast failures rejected while open.
    pub total_timeouts: u64,
    /// Lifetime transitions into the open state.
    pub total_circuit_opens: u64,
    /// Lifetime success rate, 0.0 when no requests were made.
    pub success_rate: f64,
    /// Lifetime failure rate, 0.0 when no requests were made.
    pub failure_rate: f64,
    /// When the last dependency fault was recorded.
    pub last_failure_time: Option<Instant>,
    /// When the circuit last opened, if currently open.
    pub opened_at: Option<Instant>,
}

/// Tracks one backend's health and gates calls to it.
///
/// The breaker is cheap to share: wrap it in an `Arc` and call
/// [`call`](Self::call) from any number of tasks. All bookkeeping
/// happens under one short-lived mutex; the wrapped operation itself
/// runs with no lock held, so a slow backend call never blocks other
/// callers' bookkeeping.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker for `name` with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_valid_config(name, CircuitBreakerConfig::default())
    }

    /// Create a breaker for `name` with a custom configuration.
    pub fn with_config(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(name, config))
    }

    /// Construct from a configuration already known to be valid.
    pub(crate) fn from_valid_config(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Backend name this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's immutable configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute `operation` through the breaker.
    ///
    /// If the circuit is open and the cooldown has not elapsed, the
    /// operation is never invoked and [`BreakerError::Open`] is
    /// returned. Otherwise the operation runs and its outcome is
    /// recorded: errors whose [`Fault::is_dependency_fault`] reports
    /// `true` count toward tripping the circuit, every other error is
    /// re-raised untouched. The operation's result is never swallowed.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        E: Fault,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(retry_after) = self.check_gate() {
            return Err(BreakerError::Open {
                backend: self.name.clone(),
                retry_after,
            });
        }

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) if err.is_dependency_fault() => {
                self.on_dependency_fault();
                Err(BreakerError::Inner(err))
            }
            Err(err) => {
                // Programmer / validation error: re-raise verbatim,
                // no counter or state change.
                debug!(backend = %self.name, "non-dependency error passed through breaker");
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Gate check for one request. Returns the remaining cooldown when
    /// the call must fail fast, `None` when it may proceed.
    fn check_gate(&self) -> Option<Duration> {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;

        if inner.state != CircuitState::Open {
            return None;
        }

        let elapsed = inner.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
        if elapsed >= self.config.timeout {
            info!(backend = %self.name, "circuit transitioning from open to half-open");
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            inner.failure_count = 0;
            None
        } else {
            inner.total_timeouts += 1;
            Some(self.config.timeout - elapsed)
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;

        match inner.state {
            CircuitState::Closed => {
                // Isolated failures decay, they are not forgiven
                // wholesale on the first success.
                inner.failure_count = inner.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    info!(
                        backend = %self.name,
                        successes = inner.success_count,
                        "circuit closed after successful probes"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {
                // A force_open raced an in-flight call; keep the
                // lifetime counter, leave the state alone.
            }
        }
    }

    fn on_dependency_fault(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(backend = %self.name, "probe failed, circuit reopening");
                self.trip(&mut inner);
            }
            CircuitState::Closed => {
                let count_trip = inner.failure_count >= self.config.failure_threshold;
                let rate_trip = inner.total_requests >= self.config.min_requests_for_rate
                    && inner.total_failures as f64 / inner.total_requests as f64
                        >= self.config.failure_rate_threshold;
                if count_trip || rate_trip {
                    warn!(
                        backend = %self.name,
                        failure_count = inner.failure_count,
                        total_failures = inner.total_failures,
                        total_requests = inner.total_requests,
                        by_rate = rate_trip && !count_trip,
                        "circuit opened"
                    );
                    self.trip(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Transition to open. Caller holds the lock.
    fn trip(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.success_count = 0;
        inner.total_circuit_opens += 1;
    }

    /// Manually open the circuit.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        warn!(backend = %self.name, "circuit forced open");
        self.trip(&mut inner);
    }

    /// Manually close the circuit, keeping lifetime counters.
    pub fn force_closed(&self) {
        let mut inner = self.inner.lock();
        info!(backend = %self.name, "circuit forced closed");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at = None;
    }

    /// Return to closed with every counter zeroed. Idempotent.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(backend = %self.name, "circuit breaker reset");
        *inner = BreakerState::new();
    }

    /// Current operating state.
    ///
    /// This is a pure read: the time-based open-to-half-open
    /// transition only happens when a call arrives at the gate.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Read-only snapshot including computed success / failure rates.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        let (success_rate, failure_rate) = if inner.total_requests == 0 {
            (0.0, 0.0)
        } else {
            let total = inner.total_requests as f64;
            (
                inner.total_successes as f64 / total,
                inner.total_failures as f64 / total,
            )
        };
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_timeouts: inner.total_timeouts,
            total_circuit_opens: inner.total_circuit_opens,
            success_rate,
            failure_rate,
            last_failure_time: inner.last_failure_time,
            opened_at: inner.opened_at,
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("backend unreachable")]
        Backend,
        #[error("bad argument")]
        BadArgument,
    }

    impl Fault for TestError {
        fn is_dependency_fault(&self) -> bool {
            matches!(self, Self::Backend)
        }
    }

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_timeout(Duration::from_millis(50))
            // Keep the rate rule out of the way unless a test wants it.
            .with_rate_rule(1.0, u64::MAX)
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .call(|| async { Err::<(), _>(TestError::Backend) })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker) {
        breaker
            .call(|| async { Ok::<_, TestError>(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn starts_closed_and_passes_calls() {
        let breaker = CircuitBreaker::new("b");
        let out = breaker.call(|| async { Ok::<_, TestError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_at_failure_threshold_then_fails_fast() {
        let breaker = CircuitBreaker::with_config("x", quick_config()).unwrap();

        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Fourth call is rejected without running the operation.
        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = breaker
            .call(|| async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));

        let snap = breaker.snapshot();
        assert_eq!(snap.total_timeouts, 1);
        assert_eq!(snap.total_circuit_opens, 1);
    }

    #[tokio::test]
    async fn cooldown_allows_probe_and_failure_reopens() {
        let breaker = CircuitBreaker::with_config("x", quick_config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        let first_open = breaker.snapshot().opened_at.unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;

        // Probe executes and its failure reopens immediately.
        fail(&breaker).await;
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.total_circuit_opens, 2);
        assert!(snap.opened_at.unwrap() > first_open);
    }

    #[tokio::test]
    async fn successes_in_half_open_close_the_circuit() {
        let breaker = CircuitBreaker::with_config("x", quick_config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        // success_threshold defaults to 2.
        succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await;

        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
        assert!(snap.opened_at.is_none());
    }

    #[tokio::test]
    async fn rate_rule_trips_before_absolute_count() {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(1000)
            .with_rate_rule(0.5, 10);
        let breaker = CircuitBreaker::with_config("x", config).unwrap();

        // 4 successes then 6 failures: 6/10 = 60% >= 50%.
        for _ in 0..4 {
            succeed(&breaker).await;
        }
        for _ in 0..5 {
            fail(&breaker).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn non_dependency_errors_never_count() {
        let breaker = CircuitBreaker::with_config(
            "x",
            quick_config().with_failure_threshold(1),
        )
        .unwrap();

        for _ in 0..20 {
            let result = breaker
                .call(|| async { Err::<(), _>(TestError::BadArgument) })
                .await;
            assert!(matches!(
                result,
                Err(BreakerError::Inner(TestError::BadArgument))
            ));
        }

        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.total_failures, 0);
        assert_eq!(snap.total_requests, 20);
    }

    #[tokio::test]
    async fn closed_success_decays_failure_count_by_one() {
        let breaker = CircuitBreaker::with_config("x", quick_config()).unwrap();
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.snapshot().failure_count, 2);

        succeed(&breaker).await;
        assert_eq!(breaker.snapshot().failure_count, 1);

        // Decay floors at zero.
        succeed(&breaker).await;
        succeed(&breaker).await;
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let breaker = CircuitBreaker::with_config("x", quick_config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        breaker.reset();
        let first = breaker.snapshot();
        breaker.reset();
        let second = breaker.snapshot();

        for snap in [first, second] {
            assert_eq!(snap.state, CircuitState::Closed);
            assert_eq!(snap.failure_count, 0);
            assert_eq!(snap.total_requests, 0);
            assert_eq!(snap.total_failures, 0);
            assert_eq!(snap.total_timeouts, 0);
            assert_eq!(snap.total_circuit_opens, 0);
            assert!(snap.opened_at.is_none());
            assert!(snap.last_failure_time.is_none());
        }
    }

    #[tokio::test]
    async fn manual_controls() {
        let breaker = CircuitBreaker::new("x");
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().total_circuit_opens, 1);

        breaker.force_closed();
        assert_eq!(breaker.state(), CircuitState::Closed);
        // Lifetime counters survive force_closed.
        assert_eq!(breaker.snapshot().total_circuit_opens, 1);
    }

    #[tokio::test]
    async fn snapshot_rates() {
        let breaker = CircuitBreaker::with_config("x", quick_config()).unwrap();
        assert!((breaker.snapshot().success_rate - 0.0).abs() < f64::EPSILON);

        succeed(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;
        fail(&breaker).await;

        let snap = breaker.snapshot();
        assert!((snap.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((snap.failure_rate - 0.5).abs() < f64::EPSILON);
    }
}
