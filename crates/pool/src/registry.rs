//! Process-wide registry of named pools.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config::PoolConfig;
use crate::connector::Connector;
use crate::error::PoolError;
use crate::pool::{ConnectionPool, PoolStats};

/// Object-safe slice of a pool, so the registry can report stats and close
/// pools without knowing their connection types.
#[async_trait]
trait ErasedPool: Send + Sync {
    async fn stats(&self) -> PoolStats;
    async fn close(&self);
}

#[async_trait]
impl<C: Connector> ErasedPool for ConnectionPool<C> {
    async fn stats(&self) -> PoolStats {
        ConnectionPool::stats(self).await
    }

    async fn close(&self) {
        ConnectionPool::close(self).await;
    }
}

/// Both views of one registered pool; `any` recovers the concrete type,
/// `erased` drives the type-blind bulk operations.
struct PoolEntry {
    any: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedPool>,
}

impl PoolEntry {
    fn new<C: Connector>(pool: Arc<ConnectionPool<C>>) -> Self {
        Self {
            any: Arc::clone(&pool) as Arc<dyn Any + Send + Sync>,
            erased: pool,
        }
    }

    fn downcast<C: Connector>(&self, name: &str) -> Result<ConnectionPool<C>, PoolError> {
        self.any
            .clone()
            .downcast::<ConnectionPool<C>>()
            .map(|pool| (*pool).clone())
            .map_err(|_| PoolError::type_mismatch(name))
    }
}

/// Maps backend names to pools. Pools of different connection types can
/// coexist under different names; a name is bound to the connection type of
/// whichever caller registered it first.
#[derive(Default)]
pub struct ConnectionPoolRegistry {
    pools: DashMap<String, PoolEntry>,
}

impl ConnectionPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool registered under `name`, creating it with
    /// `connector` and `config` if absent.
    ///
    /// Creation is first-writer-wins: under a race, one caller's pool is
    /// kept and the others receive it; their own freshly built pools are
    /// dropped, which also stops their maintenance tasks. Fails if `name`
    /// is already bound to a different connection type.
    pub async fn get_or_create<C: Connector>(
        &self,
        name: &str,
        connector: C,
        config: PoolConfig,
    ) -> Result<ConnectionPool<C>, PoolError> {
        if let Some(entry) = self.pools.get(name) {
            return entry.downcast(name);
        }

        let pool = Arc::new(ConnectionPool::new(name, connector, config).await?);
        let entry = self
            .pools
            .entry(name.to_string())
            .or_insert_with(|| PoolEntry::new(Arc::clone(&pool)));
        let registered = entry.downcast(name);
        drop(entry);
        if registered.is_ok() {
            debug!(backend = %name, "connection pool registered");
        }
        registered
    }

    /// Returns the pool registered under `name`, if any. `None` when the
    /// name is unknown or bound to a different connection type.
    pub fn get<C: Connector>(&self, name: &str) -> Option<ConnectionPool<C>> {
        self.pools.get(name)?.downcast(name).ok()
    }

    pub fn names(&self) -> Vec<String> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Stats for every registered pool, keyed by backend name.
    pub async fn all_stats(&self) -> HashMap<String, PoolStats> {
        let pools: Vec<(String, Arc<dyn ErasedPool>)> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().erased)))
            .collect();

        let mut stats = HashMap::with_capacity(pools.len());
        for (name, pool) in pools {
            stats.insert(name, pool.stats().await);
        }
        stats
    }

    /// Closes and forgets every registered pool.
    pub async fn close_all(&self) {
        let pools: Vec<Arc<dyn ErasedPool>> = self
            .pools
            .iter()
            .map(|entry| Arc::clone(&entry.value().erased))
            .collect();
        self.pools.clear();
        for pool in pools {
            pool.close().await;
        }
    }
}

impl std::fmt::Debug for ConnectionPoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPoolRegistry")
            .field("pools", &self.pools.len())
            .finish()
    }
}

/// The process-wide registry.
pub fn registry() -> &'static ConnectionPoolRegistry {
    static REGISTRY: OnceLock<ConnectionPoolRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ConnectionPoolRegistry::new)
}
