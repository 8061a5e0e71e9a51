use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use deadpool::managed::{Manager, Metrics, RecycleError, RecycleResult};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionState};
use crate::driver::Connector;
use crate::error::SqlMiddlewareDbError;

/// deadpool manager that opens and vets [`Connection`]s.
pub struct ConnectionManager {
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
    evicted: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            evicted: AtomicU64::new(0),
        }
    }

    /// Connections thrown away instead of being returned to the idle set.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub(crate) fn record_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("evicted", &self.evicted())
            .finish_non_exhaustive()
    }
}

impl Manager for ConnectionManager {
    type Type = Connection;
    type Error = SqlMiddlewareDbError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        Connection::open(Arc::clone(&self.config), Arc::clone(&self.connector)).await
    }

    // A lease dropped without an explicit release comes back through here.
    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        match conn.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::InTransaction => {
                debug!(conn_id = conn.id(), "discarding pooled connection with an open transaction");
                self.record_eviction();
                Err(RecycleError::Message(
                    "connection returned with an open transaction".into(),
                ))
            }
            ConnectionState::Disconnected => {
                debug!(conn_id = conn.id(), "discarding disconnected pooled connection");
                self.record_eviction();
                Err(RecycleError::Message("connection is no longer open".into()))
            }
        }
    }
}
