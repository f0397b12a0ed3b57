//! # ballast-breaker
//!
//! Per-backend circuit breakers for adapters that talk to unreliable
//! remote systems. A breaker tracks one backend's health as a
//! closed / open / half-open state machine and fails fast while the
//! backend is known unhealthy, re-probing after a cooldown.
//!
//! Two rules open a closed circuit: an absolute count of accumulated
//! failures, and a lifetime failure rate once enough requests have
//! been seen. Only errors classified as dependency faults by the
//! [`Fault`] trait count; anything else passes through untouched.
//!
//! ```
//! use ballast_breaker::{CircuitBreaker, CircuitBreakerConfig, Fault};
//! use std::time::Duration;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("gateway timed out")]
//! struct GatewayError;
//! impl Fault for GatewayError {}
//!
//! # tokio_test::block_on(async {
//! let breaker = CircuitBreaker::with_config(
//!     "ipfs-gateway",
//!     CircuitBreakerConfig::default().with_timeout(Duration::from_secs(30)),
//! )
//! .unwrap();
//!
//! let result = breaker
//!     .call(|| async { Ok::<_, GatewayError>("pinned") })
//!     .await;
//! assert_eq!(result.unwrap(), "pinned");
//! # });
//! ```

mod breaker;
mod config;
mod error;
mod registry;
mod wrapper;

pub use breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::CircuitBreakerConfig;
pub use error::{BreakerError, ConfigError, Fault};
pub use registry::{CircuitBreakerRegistry, registry};
pub use wrapper::Guarded;
