//! RAII guard for a checked-out connection.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::connector::Connector;
use crate::pool::{Meta, PoolShared, forget, give_back};

/// A connection on loan from a [`ConnectionPool`](crate::ConnectionPool).
///
/// Dereferences to the underlying connection. Prefer [`release`] when done:
/// it returns the connection synchronously, so a follow-up `acquire` is
/// guaranteed to see the freed slot. Dropping the guard also returns the
/// connection, but through a spawned task, so the hand-back is eventually
/// consistent.
///
/// [`release`]: PooledConnection::release
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Conn>,
    meta: Meta,
    shared: Arc<PoolShared<C>>,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(conn: C::Conn, meta: Meta, shared: Arc<PoolShared<C>>) -> Self {
        Self {
            conn: Some(conn),
            meta,
            shared,
        }
    }

    /// Unique id of this connection, stable across reuses.
    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    /// How long ago the underlying connection was opened.
    pub fn age(&self) -> Duration {
        self.meta.created_at.elapsed()
    }

    /// Number of times this connection has been checked out, including the
    /// current lease.
    pub fn use_count(&self) -> u64 {
        self.meta.use_count
    }

    /// Returns the connection to the pool and waits for the hand-back to
    /// complete. The pool may recycle it instead of re-queueing it.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            let shared = Arc::clone(&self.shared);
            let id = self.meta.id;
            drop(self);
            give_back(&shared, id, conn).await;
        }
    }

    /// Takes the connection out of the pool permanently. Its slot is freed
    /// so the pool can open a replacement.
    pub async fn detach(mut self) -> C::Conn {
        let conn = self.conn.take().expect("connection already taken");
        let shared = Arc::clone(&self.shared);
        let id = self.meta.id;
        drop(self);
        forget(&shared, id).await;
        conn
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already taken")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already taken")
    }
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("backend", &self.shared.name)
            .field("id", &self.meta.id)
            .field("use_count", &self.meta.use_count)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let shared = Arc::clone(&self.shared);
            let id = self.meta.id;
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        give_back(&shared, id, conn).await;
                    });
                }
                Err(_) => {
                    warn!(
                        backend = %shared.name,
                        %id,
                        "pooled connection dropped outside a runtime; slot not reclaimed"
                    );
                }
            }
        }
    }
}
