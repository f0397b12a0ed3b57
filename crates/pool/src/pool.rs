//! Bounded async connection pool with background maintenance.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::connector::Connector;
use crate::error::PoolError;

/// Pause before retrying the connector after a failed `connect`, capped by
/// the caller's remaining acquire budget.
const CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Point-in-time view of a pool, used for logging and capacity planning.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub total_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub total_created: u64,
    pub total_recycled: u64,
    pub total_health_check_failures: u64,
    pub total_timeouts: u64,
    pub peak_size: usize,
}

/// Book-keeping carried alongside every live connection.
#[derive(Debug, Clone)]
pub(crate) struct Meta {
    pub(crate) id: Uuid,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) use_count: u64,
}

impl Meta {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }
}

struct Idle<T> {
    conn: T,
    meta: Meta,
}

struct PoolState<T> {
    available: VecDeque<Idle<T>>,
    in_use: HashMap<Uuid, Meta>,
    closed: bool,
    total_created: u64,
    total_recycled: u64,
    total_health_check_failures: u64,
    total_timeouts: u64,
    peak_size: usize,
}

impl<T> PoolState<T> {
    fn new() -> Self {
        Self {
            available: VecDeque::new(),
            in_use: HashMap::new(),
            closed: false,
            total_created: 0,
            total_recycled: 0,
            total_health_check_failures: 0,
            total_timeouts: 0,
            peak_size: 0,
        }
    }

    fn live(&self) -> usize {
        self.available.len() + self.in_use.len()
    }

    fn record_peak(&mut self) {
        self.peak_size = self.peak_size.max(self.live());
    }
}

pub(crate) struct PoolShared<C: Connector> {
    pub(crate) name: String,
    connector: C,
    config: PoolConfig,
    state: Mutex<PoolState<C::Conn>>,
    notify: Notify,
}

/// Why an idle connection was rejected before reuse.
enum Validity {
    Valid,
    Expired,
    Unhealthy,
}

async fn check_validity<C: Connector>(shared: &PoolShared<C>, idle: &Idle<C::Conn>) -> Validity {
    if idle.meta.created_at.elapsed() > shared.config.max_connection_lifetime {
        return Validity::Expired;
    }
    if idle.meta.last_used_at.elapsed() > shared.config.max_idle_time {
        return Validity::Expired;
    }
    if shared.connector.check(&idle.conn).await {
        Validity::Valid
    } else {
        Validity::Unhealthy
    }
}

/// A bounded pool of connections to one named backend.
///
/// Cloning is cheap and shares the same pool. The pool fills to `min_size`
/// on construction, lends connections out through [`PooledConnection`]
/// guards, and runs a background maintenance task that evicts stale idles
/// and tops the pool back up. The task holds only a weak reference, so
/// dropping every pool handle shuts it down.
pub struct ConnectionPool<C: Connector> {
    shared: Arc<PoolShared<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Builds a pool and fills it to `min_size`.
    ///
    /// Connector failures during the initial fill are logged and skipped;
    /// the maintenance loop keeps trying to reach `min_size` afterwards.
    /// Must be called from within a tokio runtime.
    pub async fn new(name: impl Into<String>, connector: C, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let name = name.into();
        let shared = Arc::new(PoolShared {
            name,
            connector,
            config,
            state: Mutex::new(PoolState::new()),
            notify: Notify::new(),
        });

        {
            let mut state = shared.state.lock().await;
            for _ in 0..shared.config.min_size {
                match shared.connector.connect().await {
                    Ok(conn) => {
                        state.total_created += 1;
                        state.available.push_back(Idle {
                            conn,
                            meta: Meta::fresh(),
                        });
                        state.record_peak();
                    }
                    Err(err) => {
                        warn!(
                            backend = %shared.name,
                            error = %err,
                            "initial fill connection failed"
                        );
                    }
                }
            }
            info!(
                backend = %shared.name,
                size = state.live(),
                min_size = shared.config.min_size,
                max_size = shared.config.max_size,
                "connection pool started"
            );
        }

        spawn_maintenance(&shared);
        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Checks out a connection, waiting at most `timeout`.
    ///
    /// Idle connections are revalidated before reuse; if none survive and
    /// the pool is below `max_size`, a fresh one is opened. At capacity the
    /// caller parks until a release or the deadline. Returns `None` when the
    /// deadline passes or the pool has been closed.
    pub async fn acquire(&self, timeout: Duration) -> Option<PooledConnection<C>> {
        let deadline = Instant::now() + timeout;
        loop {
            enum Wait {
                Release,
                Retry,
            }

            let wait = {
                let mut state = self.shared.state.lock().await;
                if state.closed {
                    debug!(backend = %self.shared.name, "acquire on closed pool");
                    return None;
                }

                // Reuse the oldest idle connection that still checks out.
                while let Some(idle) = state.available.pop_front() {
                    match check_validity(&self.shared, &idle).await {
                        Validity::Valid => {
                            let Idle { conn, mut meta } = idle;
                            meta.use_count += 1;
                            meta.last_used_at = Instant::now();
                            let handoff = meta.clone();
                            state.in_use.insert(meta.id, meta);
                            return Some(PooledConnection::new(conn, handoff, Arc::clone(&self.shared)));
                        }
                        Validity::Expired => {
                            debug!(backend = %self.shared.name, id = %idle.meta.id, "dropping expired idle connection");
                        }
                        Validity::Unhealthy => {
                            state.total_health_check_failures += 1;
                            debug!(backend = %self.shared.name, id = %idle.meta.id, "dropping unhealthy idle connection");
                        }
                    }
                }

                if state.live() < self.shared.config.max_size {
                    match self.shared.connector.connect().await {
                        Ok(conn) => {
                            let mut meta = Meta::fresh();
                            meta.use_count = 1;
                            let handoff = meta.clone();
                            state.total_created += 1;
                            state.in_use.insert(meta.id, meta);
                            state.record_peak();
                            return Some(PooledConnection::new(conn, handoff, Arc::clone(&self.shared)));
                        }
                        Err(err) => {
                            warn!(backend = %self.shared.name, error = %err, "connector failed during acquire");
                            Wait::Retry
                        }
                    }
                } else {
                    Wait::Release
                }
            };

            let now = Instant::now();
            if now >= deadline {
                self.note_timeout().await;
                return None;
            }
            match wait {
                Wait::Release => {
                    if tokio::time::timeout_at(deadline, self.shared.notify.notified())
                        .await
                        .is_err()
                    {
                        self.note_timeout().await;
                        return None;
                    }
                }
                Wait::Retry => {
                    let pause = CONNECT_RETRY_PAUSE.min(deadline - now);
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    async fn note_timeout(&self) {
        let mut state = self.shared.state.lock().await;
        state.total_timeouts += 1;
        debug!(
            backend = %self.shared.name,
            in_use = state.in_use.len(),
            "acquire timed out"
        );
    }

    /// Closes the pool. Idle connections are dropped immediately; checked
    /// out connections are dropped when their guards come back. Subsequent
    /// `acquire` calls return `None` without waiting. Idempotent.
    pub async fn close(&self) {
        let mut state = self.shared.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.available.len();
        let outstanding = state.in_use.len();
        state.available.clear();
        state.in_use.clear();
        info!(
            backend = %self.shared.name,
            dropped,
            outstanding,
            "connection pool closed"
        );
        drop(state);
        self.shared.notify.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.shared.state.lock().await.closed
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().await;
        PoolStats {
            available: state.available.len(),
            in_use: state.in_use.len(),
            total_size: state.live(),
            min_size: self.shared.config.min_size,
            max_size: self.shared.config.max_size,
            total_created: state.total_created,
            total_recycled: state.total_recycled,
            total_health_check_failures: state.total_health_check_failures,
            total_timeouts: state.total_timeouts,
            peak_size: state.peak_size,
        }
    }
}

/// Returns a connection to the pool, retiring it if the recycle policy says
/// its useful life is over. Called by guard release and drop.
pub(crate) async fn give_back<C: Connector>(shared: &Arc<PoolShared<C>>, id: Uuid, conn: C::Conn) {
    let mut state = shared.state.lock().await;
    let Some(mut meta) = state.in_use.remove(&id) else {
        if state.closed {
            debug!(backend = %shared.name, %id, "connection returned after pool close");
        } else {
            warn!(backend = %shared.name, %id, "returned connection is not leased from this pool");
        }
        return;
    };

    let recycle_age = shared
        .config
        .max_connection_lifetime
        .mul_f64(shared.config.recycle.lifetime_fraction);
    if meta.created_at.elapsed() > recycle_age || meta.use_count > shared.config.recycle.max_uses {
        debug!(
            backend = %shared.name,
            %id,
            use_count = meta.use_count,
            "recycling connection"
        );
        drop(conn);
        state.total_recycled += 1;
        if state.live() < shared.config.min_size {
            match shared.connector.connect().await {
                Ok(replacement) => {
                    state.total_created += 1;
                    state.available.push_back(Idle {
                        conn: replacement,
                        meta: Meta::fresh(),
                    });
                    state.record_peak();
                }
                Err(err) => {
                    warn!(backend = %shared.name, error = %err, "replacement connection failed");
                }
            }
        }
    } else {
        meta.last_used_at = Instant::now();
        state.available.push_back(Idle { conn, meta });
    }
    drop(state);
    shared.notify.notify_one();
}

/// Removes a detached connection from the lease table, freeing its slot.
pub(crate) async fn forget<C: Connector>(shared: &Arc<PoolShared<C>>, id: Uuid) {
    let mut state = shared.state.lock().await;
    if state.in_use.remove(&id).is_some() {
        debug!(backend = %shared.name, %id, "connection detached from pool");
    }
    drop(state);
    shared.notify.notify_one();
}

fn spawn_maintenance<C: Connector>(shared: &Arc<PoolShared<C>>) {
    let weak = Arc::downgrade(shared);
    let period = shared.config.health_check_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; skip it so maintenance
        // starts one full period after construction.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else { break };
            if !maintenance_pass(&shared).await {
                break;
            }
        }
    });
}

/// One maintenance sweep: evict idles that are expired, stale, or fail the
/// health probe, then top the pool back up to `min_size`. Returns `false`
/// once the pool is closed.
async fn maintenance_pass<C: Connector>(shared: &Arc<PoolShared<C>>) -> bool {
    let mut state = shared.state.lock().await;
    if state.closed {
        return false;
    }

    let mut kept = VecDeque::with_capacity(state.available.len());
    let mut evicted = 0usize;
    while let Some(idle) = state.available.pop_front() {
        match check_validity(shared, &idle).await {
            Validity::Valid => kept.push_back(idle),
            Validity::Expired => evicted += 1,
            Validity::Unhealthy => {
                state.total_health_check_failures += 1;
                evicted += 1;
            }
        }
    }
    state.available = kept;

    let mut added = 0usize;
    while state.live() < shared.config.min_size {
        match shared.connector.connect().await {
            Ok(conn) => {
                state.total_created += 1;
                state.available.push_back(Idle {
                    conn,
                    meta: Meta::fresh(),
                });
                state.record_peak();
                added += 1;
            }
            Err(err) => {
                warn!(backend = %shared.name, error = %err, "top-up connection failed");
                break;
            }
        }
    }

    if evicted > 0 || added > 0 {
        debug!(backend = %shared.name, evicted, added, "maintenance pass");
    }
    drop(state);
    for _ in 0..added {
        shared.notify.notify_one();
    }
    true
}
