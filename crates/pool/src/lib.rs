//! Bounded, self-healing connection pools keyed by backend name.
//!
//! A [`ConnectionPool`] owns connections produced by a [`Connector`] and
//! lends them out as RAII [`PooledConnection`] guards. The pool keeps at
//! least `min_size` and at most `max_size` connections alive, revalidates
//! idle connections before reuse, proactively recycles worn-out ones, and
//! runs a background maintenance loop that evicts stale idles and tops the
//! pool back up. [`ConnectionPoolRegistry`] shares pools by name across a
//! process.
//!
//! ```
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use ballast_pool::{ConnectError, ConnectionPool, Connector, PoolConfig};
//!
//! struct Memory;
//!
//! #[async_trait]
//! impl Connector for Memory {
//!     type Conn = Vec<u8>;
//!
//!     async fn connect(&self) -> Result<Self::Conn, ConnectError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let pool = ConnectionPool::new("memory", Memory, PoolConfig::default())
//!     .await
//!     .unwrap();
//! let mut conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
//! conn.push(42);
//! conn.release().await;
//! # });
//! ```

mod config;
mod connection;
mod connector;
mod error;
mod pool;
mod registry;

pub use config::{PoolConfig, RecyclePolicy};
pub use connection::PooledConnection;
pub use connector::Connector;
pub use error::{ConnectError, PoolError};
pub use pool::{ConnectionPool, PoolStats};
pub use registry::{ConnectionPoolRegistry, registry};
