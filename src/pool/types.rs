use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use deadpool::Runtime;
use deadpool::managed::{Pool, PoolError, Timeouts};
use tracing::{debug, warn};

use super::connection::MiddlewarePoolConnection;
use super::manager::ConnectionManager;
use crate::config::{ConnectionConfig, PoolOptions};
use crate::connection::ConnectionState;
use crate::driver::Connector;
use crate::error::SqlMiddlewareDbError;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Upper bound on open connections.
    pub capacity: usize,
    /// Connections currently open, idle or leased.
    pub open: usize,
    pub idle: usize,
    pub leased: usize,
    /// Callers blocked in `acquire`.
    pub waiting: usize,
    /// Connections discarded since the pool was created.
    pub evicted: u64,
}

/// Bounded pool of [`crate::Connection`]s to one server.
///
/// Connections are opened lazily, at most `max_size` exist at once, and callers
/// beyond that wait in `acquire` until a lease is released or their timeout expires.
#[derive(Clone)]
pub struct MiddlewarePool {
    pool: Pool<ConnectionManager>,
    acquire_timeout: Duration,
}

impl fmt::Debug for MiddlewarePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePool")
            .field("manager", self.pool.manager())
            .field("status", &self.status())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl MiddlewarePool {
    /// Build a pool. No connection is opened until the first `acquire`.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` if the pool cannot be built.
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
    ) -> Result<Self, SqlMiddlewareDbError> {
        let manager = ConnectionManager::new(config, connector);
        let pool = Pool::builder(manager)
            .max_size(options.max_size())
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| SqlMiddlewareDbError::ConfigError(format!("failed to build pool: {e}")))?;

        Ok(Self {
            pool,
            acquire_timeout: options.acquire_timeout(),
        })
    }

    /// Lease a connection, waiting up to the pool's configured acquire timeout.
    ///
    /// # Errors
    /// See [`MiddlewarePool::acquire_timeout`].
    pub async fn acquire(&self) -> Result<MiddlewarePoolConnection, SqlMiddlewareDbError> {
        self.acquire_timeout(self.acquire_timeout).await
    }

    /// Lease a connection, waiting up to `wait` for one to become free.
    ///
    /// An idle connection is reused if there is one; otherwise a new one is opened
    /// while the pool is below capacity.
    ///
    /// # Errors
    /// Returns `PoolExhausted` if nothing frees up within `wait` or the pool is
    /// closed, and `ConnectError` if opening a new connection fails.
    pub async fn acquire_timeout(
        &self,
        wait: Duration,
    ) -> Result<MiddlewarePoolConnection, SqlMiddlewareDbError> {
        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(wait);

        match self.pool.timeout_get(&timeouts).await {
            Ok(object) => {
                debug!(conn_id = object.id(), "connection leased");
                Ok(MiddlewarePoolConnection::new(object))
            }
            Err(PoolError::Timeout(_)) => Err(SqlMiddlewareDbError::PoolExhausted(format!(
                "no connection became available within {wait:?} (max_size {})",
                self.pool.status().max_size
            ))),
            Err(PoolError::Closed) => {
                Err(SqlMiddlewareDbError::PoolExhausted("pool is closed".into()))
            }
            Err(PoolError::Backend(err)) => {
                warn!(error = %err, "failed to open pooled connection");
                Err(err)
            }
            Err(other) => Err(SqlMiddlewareDbError::Other(format!(
                "pool failed to provide a connection: {other}"
            ))),
        }
    }

    /// Hand a lease back.
    ///
    /// A healthy connection outside any transaction goes back to the idle set.
    /// Anything else is disconnected and its slot freed for a fresh connection.
    pub async fn release(&self, mut lease: MiddlewarePoolConnection, healthy: bool) {
        let state = lease.state();
        if healthy && state == ConnectionState::Connected {
            debug!(conn_id = lease.id(), "connection returned to pool");
            drop(lease);
            return;
        }

        if healthy && state == ConnectionState::InTransaction {
            warn!(conn_id = lease.id(), "connection released with an open transaction; evicting");
        }
        // Hold the slot until the session is closed; at most max_size sessions exist.
        debug!(conn_id = lease.id(), ?state, healthy, "evicting connection");
        lease.disconnect().await;
        drop(lease.detach());
        self.pool.manager().record_eviction();
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            capacity: status.max_size,
            open: status.size,
            idle: status.available,
            leased: status.size.saturating_sub(status.available),
            waiting: status.waiting,
            evicted: self.pool.manager().evicted(),
        }
    }

    /// Stop handing out connections and drop the idle ones.
    ///
    /// Outstanding leases stay usable; their connections are closed when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        self.pool.manager().config()
    }
}
