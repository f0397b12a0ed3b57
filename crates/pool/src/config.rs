//! Pool sizing and maintenance configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Tuning knobs for a [`ConnectionPool`](crate::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Floor the maintenance loop tops the pool back up to.
    pub min_size: usize,
    /// Hard cap on live connections (idle plus checked out).
    pub max_size: usize,
    /// Idle connections older than this are evicted by maintenance.
    pub max_idle_time: Duration,
    /// Connections past this age are never handed out again.
    pub max_connection_lifetime: Duration,
    /// Cadence of the background maintenance pass.
    pub health_check_interval: Duration,
    /// When a returned connection is proactively retired.
    pub recycle: RecyclePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            max_idle_time: Duration::from_secs(300),
            max_connection_lifetime: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(60),
            recycle: RecyclePolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Sets both size bounds at once.
    pub fn with_size(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn with_max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_connection_lifetime = lifetime;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_recycle(mut self, recycle: RecyclePolicy) -> Self {
        self.recycle = recycle;
        self
    }

    /// Rejects configurations that would make the pool inert or unbounded.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::invalid_config("max_size must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::invalid_config(format!(
                "min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.max_connection_lifetime.is_zero() {
            return Err(PoolError::invalid_config(
                "max_connection_lifetime must be non-zero",
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(PoolError::invalid_config(
                "health_check_interval must be non-zero",
            ));
        }
        self.recycle.validate()
    }
}

/// A returned connection is retired instead of going back on the idle queue
/// once it is close to its lifetime limit or has served too many leases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecyclePolicy {
    /// Fraction of `max_connection_lifetime` after which a returned
    /// connection is recycled rather than reused.
    pub lifetime_fraction: f64,
    /// Lease count past which a returned connection is recycled.
    pub max_uses: u64,
}

impl Default for RecyclePolicy {
    fn default() -> Self {
        Self {
            lifetime_fraction: 0.9,
            max_uses: 1000,
        }
    }
}

impl RecyclePolicy {
    fn validate(&self) -> Result<(), PoolError> {
        if !(self.lifetime_fraction > 0.0 && self.lifetime_fraction <= 1.0) {
            return Err(PoolError::invalid_config(format!(
                "recycle.lifetime_fraction must be in (0.0, 1.0], got {}",
                self.lifetime_fraction
            )));
        }
        if self.max_uses == 0 {
            return Err(PoolError::invalid_config(
                "recycle.max_uses must be at least 1",
            ));
        }
        Ok(())
    }
}
