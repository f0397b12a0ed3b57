//! Circuit breaker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a [`CircuitBreaker`](crate::CircuitBreaker).
///
/// Two independent rules can open a closed circuit: an absolute count
/// of accumulated failures (`failure_threshold`) and a lifetime
/// failure rate (`failure_rate_threshold`) that only applies once
/// `min_requests_for_rate` requests have been observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Accumulated failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,
    /// Cooldown an open circuit waits before allowing a probe.
    pub timeout: Duration,
    /// Lifetime failure rate (0.0..=1.0) that opens a closed circuit.
    pub failure_rate_threshold: f64,
    /// Minimum requests before the rate rule applies.
    pub min_requests_for_rate: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            failure_rate_threshold: 0.5,
            min_requests_for_rate: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the absolute failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the consecutive-success threshold for closing from half-open.
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open-state cooldown before probing.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the failure-rate rule parameters.
    #[must_use]
    pub fn with_rate_rule(mut self, threshold: f64, min_requests: u64) -> Self {
        self.failure_rate_threshold = threshold;
        self.min_requests_for_rate = min_requests;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::new("failure_threshold must be greater than 0"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::new("success_threshold must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::new("timeout must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err(ConfigError::new(
                "failure_rate_threshold must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}
