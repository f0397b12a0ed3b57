//! Registry of circuit breakers keyed by backend name.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::breaker::{CircuitBreaker, CircuitSnapshot};
use crate::config::CircuitBreakerConfig;
use crate::error::ConfigError;

/// Collection of circuit breakers, one per backend name.
///
/// A breaker is created on first lookup and persists for the
/// registry's lifetime. Creation is first-writer-wins: a config passed
/// for a name that already has a breaker is ignored.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers default to
    /// [`CircuitBreakerConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: CircuitBreakerConfig::default(),
        }
    }

    /// Create a registry with a custom default configuration.
    pub fn with_config(default_config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        default_config.validate()?;
        Ok(Self {
            breakers: DashMap::new(),
            default_config,
        })
    }

    /// Get the breaker for `name`, creating it with the registry's
    /// default configuration on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::from_valid_config(
                    name,
                    self.default_config.clone(),
                ))
            })
            .clone()
    }

    /// Get the breaker for `name`, creating it with `config` on first
    /// use. An existing breaker keeps its original configuration.
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(existing.clone());
        }
        config.validate()?;
        Ok(self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::from_valid_config(name, config)))
            .clone())
    }

    /// Look up an existing breaker without creating one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Names of every tracked breaker.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot every tracked breaker.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<CircuitSnapshot> {
        self.breakers.iter().map(|e| e.value().snapshot()).collect()
    }

    /// Reset every tracked breaker to closed with zeroed counters.
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide default registry, created on first access.
///
/// Tests should construct private [`CircuitBreakerRegistry`] instances
/// instead, to avoid cross-test leakage.
pub fn registry() -> &'static CircuitBreakerRegistry {
    static REGISTRY: OnceLock<CircuitBreakerRegistry> = OnceLock::new();
    REGISTRY.get_or_init(CircuitBreakerRegistry::new)
}
