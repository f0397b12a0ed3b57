//! The seam between a pool and the backend it manages connections for.

use async_trait::async_trait;

use crate::error::ConnectError;

/// Produces and probes connections for one backend.
///
/// A pool owns exactly one connector. `connect` is awaited while the pool
/// holds its internal lock, so implementations should put their own timeout
/// on slow handshakes rather than blocking indefinitely.
///
/// ```
/// use async_trait::async_trait;
/// use ballast_pool::{ConnectError, Connector};
///
/// struct Memory;
///
/// #[async_trait]
/// impl Connector for Memory {
///     type Conn = Vec<u8>;
///
///     async fn connect(&self) -> Result<Self::Conn, ConnectError> {
///         Ok(Vec::new())
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection handle this connector produces.
    type Conn: Send + Sync + 'static;

    /// Opens a fresh connection.
    async fn connect(&self) -> Result<Self::Conn, ConnectError>;

    /// Probes an idle connection before reuse and during maintenance.
    ///
    /// The default accepts everything, for backends with no cheap liveness
    /// probe. Returning `false` drops the connection.
    async fn check(&self, conn: &Self::Conn) -> bool {
        let _ = conn;
        true
    }
}
