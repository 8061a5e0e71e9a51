use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{Instrument, Span, debug, info_span, warn};

use crate::config::ConnectionConfig;
use crate::driver::{Connector, DriverError, DriverHandle};
use crate::error::SqlMiddlewareDbError;
use crate::escape;
use crate::query_builder::StatementBuilder;
use crate::results::QueryResult;
use crate::results::materialize::{failure_before_read, materialize_outcome, materialize_rows};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    InTransaction,
}

/// One session with the server, driven through an explicit state machine.
///
/// ```text
/// Disconnected --connect--> Connected --begin--> InTransaction
///      ^                      |   ^                   |
///      +------disconnect------+   +--commit/rollback--+
/// ```
///
/// The connection never reconnects on its own. A connection-level failure during
/// any operation drops the driver handle and leaves the connection `Disconnected`;
/// the caller decides whether to `connect` again.
pub struct Connection {
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
    handle: Option<Box<dyn DriverHandle>>,
    state: ConnectionState,
    id: u64,
    span: Span,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a disconnected connection. Nothing touches the network until [`Connection::connect`].
    #[must_use]
    pub fn new(config: Arc<ConnectionConfig>, connector: Arc<dyn Connector>) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let span = info_span!(
            "mysql_connection",
            conn_id = id,
            host = %config.host(),
            database = %config.database()
        );
        Self {
            config,
            connector,
            handle: None,
            state: ConnectionState::Disconnected,
            id,
            span,
        }
    }

    /// Replace the span that this connection's log events are attached to.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Create and connect in one step.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConnectError` if the server cannot be reached,
    /// rejects the credentials, or does not answer within the connect timeout.
    pub async fn open(
        config: Arc<ConnectionConfig>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SqlMiddlewareDbError> {
        let mut conn = Self::new(config, connector);
        conn.connect().await?;
        Ok(conn)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Statement builder using this connection's charset for escaping.
    #[must_use]
    pub fn statement_builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.config.charset())
    }

    /// Open the session.
    ///
    /// # Errors
    /// Returns `StateError` if the connection is already open, and `ConnectError` if
    /// the driver fails or the configured connect timeout elapses. The connection
    /// stays `Disconnected` on error.
    pub async fn connect(&mut self) -> Result<(), SqlMiddlewareDbError> {
        if self.state != ConnectionState::Disconnected {
            return Err(SqlMiddlewareDbError::StateError(
                "connect called on a connection that is already open".into(),
            ));
        }

        let timeout = self.config.connect_timeout();
        let attempt = tokio::time::timeout(timeout, self.connector.open(&self.config))
            .instrument(self.span.clone())
            .await;

        let handle = match attempt {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => {
                warn!(parent: &self.span, error = %err, "connect failed");
                return Err(SqlMiddlewareDbError::ConnectError(format!(
                    "{}:{}: {err}",
                    self.config.host(),
                    self.config.port()
                )));
            }
            Err(_) => {
                warn!(parent: &self.span, ?timeout, "connect timed out");
                return Err(SqlMiddlewareDbError::ConnectError(format!(
                    "{}:{}: timed out after {timeout:?}",
                    self.config.host(),
                    self.config.port()
                )));
            }
        };

        self.handle = Some(handle);
        self.transition(ConnectionState::Connected);
        Ok(())
    }

    /// Close the session from any state.
    ///
    /// An open transaction is rolled back first. Rollback and close failures are
    /// logged and otherwise ignored, since the session is being thrown away.
    pub async fn disconnect(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            self.state = ConnectionState::Disconnected;
            return;
        };

        if self.state == ConnectionState::InTransaction {
            if let Err(err) = handle.execute("ROLLBACK").await {
                warn!(parent: &self.span, error = %err, "rollback before disconnect failed");
            }
        }
        if let Err(err) = handle.close().await {
            debug!(parent: &self.span, error = %err, "driver reported an error while closing");
        }
        self.transition(ConnectionState::Disconnected);
    }

    /// Run a row-returning statement and materialize every row.
    ///
    /// `sql` is sent as-is. Server rejections and read failures come back as
    /// `QueryResult::Failed`; a connection-level failure also leaves this
    /// connection `Disconnected`.
    ///
    /// # Errors
    /// Returns `NotConnected` when called on a disconnected connection.
    pub async fn execute_query(&mut self, sql: &str) -> Result<QueryResult, SqlMiddlewareDbError> {
        let handle = self.handle_mut("execute_query")?;
        let result = match handle.query(sql).await {
            Ok(mut source) => materialize_rows(source.as_mut()).await,
            Err(err) => QueryResult::Failed(failure_before_read(err)),
        };
        self.after_statement("execute_query", &result);
        Ok(result)
    }

    /// Run a statement that returns no rows (INSERT/UPDATE/DELETE/DDL).
    ///
    /// # Errors
    /// Returns `NotConnected` when called on a disconnected connection.
    pub async fn execute_statement(
        &mut self,
        sql: &str,
    ) -> Result<QueryResult, SqlMiddlewareDbError> {
        let handle = self.handle_mut("execute_statement")?;
        let result = match handle.execute(sql).await {
            Ok(outcome) => materialize_outcome(outcome),
            Err(err) => QueryResult::Failed(failure_before_read(err)),
        };
        self.after_statement("execute_statement", &result);
        Ok(result)
    }

    /// # Errors
    /// Returns `NotConnected` when disconnected, `StateError` when a transaction is
    /// already open, and `QueryError`/`ConnectionLost` if the server does not start one.
    pub async fn begin_transaction(&mut self) -> Result<(), SqlMiddlewareDbError> {
        match self.state {
            ConnectionState::Disconnected => {
                return Err(SqlMiddlewareDbError::NotConnected("begin_transaction"));
            }
            ConnectionState::InTransaction => {
                return Err(SqlMiddlewareDbError::StateError(
                    "a transaction is already open on this connection".into(),
                ));
            }
            ConnectionState::Connected => {}
        }

        self.run_control("START TRANSACTION").await?;
        self.transition(ConnectionState::InTransaction);
        Ok(())
    }

    /// Commit the open transaction.
    ///
    /// If the server refuses the commit, the transaction is rolled back so the
    /// connection never stays half inside it; if that also fails the connection is
    /// disconnected.
    ///
    /// # Errors
    /// Returns `NotConnected` when disconnected, `StateError` when no transaction is
    /// open, and `QueryError`/`ConnectionLost` if the commit fails.
    pub async fn commit_transaction(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_in_transaction("commit_transaction")?;

        match self.run_control("COMMIT").await {
            Ok(()) => {
                self.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(err) if self.is_connected() => {
                if self.run_control("ROLLBACK").await.is_ok() {
                    self.transition(ConnectionState::Connected);
                } else {
                    self.close_session().await;
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Roll back the open transaction.
    ///
    /// # Errors
    /// Returns `NotConnected` when disconnected, `StateError` when no transaction is
    /// open, and `QueryError`/`ConnectionLost` if the rollback fails. A connection
    /// whose rollback failed is disconnected.
    pub async fn rollback_transaction(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_in_transaction("rollback_transaction")?;

        match self.run_control("ROLLBACK").await {
            Ok(()) => {
                self.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                self.close_session().await;
                Err(err)
            }
        }
    }

    /// Escape `raw` for a quoted literal using this connection's charset.
    ///
    /// # Errors
    /// Returns `NotConnected` when disconnected, and `ParameterError` for text the
    /// connection charset cannot carry (see [`escape::escape_string`]).
    pub fn escape_string(&self, raw: &str) -> Result<String, SqlMiddlewareDbError> {
        if !self.is_connected() {
            return Err(SqlMiddlewareDbError::NotConnected("escape_string"));
        }
        escape::escape_string(raw, self.config.charset())
    }

    /// Round-trip to the server.
    ///
    /// # Errors
    /// Returns `NotConnected` when disconnected, and `ConnectionLost` (leaving the
    /// connection `Disconnected`) if the server does not answer.
    pub async fn ping(&mut self) -> Result<(), SqlMiddlewareDbError> {
        let outcome = self.handle_mut("ping")?.ping().await;
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => Err(self.driver_failure(err)),
        }
    }

    fn handle_mut(
        &mut self,
        op: &'static str,
    ) -> Result<&mut Box<dyn DriverHandle>, SqlMiddlewareDbError> {
        match (self.state, self.handle.as_mut()) {
            (ConnectionState::Disconnected, _) | (_, None) => {
                Err(SqlMiddlewareDbError::NotConnected(op))
            }
            (_, Some(handle)) => Ok(handle),
        }
    }

    fn ensure_in_transaction(&self, op: &'static str) -> Result<(), SqlMiddlewareDbError> {
        match self.state {
            ConnectionState::Disconnected => Err(SqlMiddlewareDbError::NotConnected(op)),
            ConnectionState::Connected => Err(SqlMiddlewareDbError::StateError(format!(
                "{op} requires an open transaction"
            ))),
            ConnectionState::InTransaction => Ok(()),
        }
    }

    async fn run_control(&mut self, sql: &'static str) -> Result<(), SqlMiddlewareDbError> {
        let outcome = self.handle_mut(sql)?.execute(sql).await;
        match outcome {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(parent: &self.span, statement = sql, error = %err, "transaction control failed");
                Err(self.driver_failure(err))
            }
        }
    }

    /// Translate a driver error, dropping the handle if the session is gone.
    fn driver_failure(&mut self, err: DriverError) -> SqlMiddlewareDbError {
        if err.is_connection_lost() {
            self.discard_handle();
        }
        err.into()
    }

    fn after_statement(&mut self, op: &'static str, result: &QueryResult) {
        match result {
            QueryResult::Failed(failure) => {
                warn!(
                    parent: &self.span,
                    op,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "statement failed"
                );
                if failure.is_connection_level() {
                    self.discard_handle();
                }
            }
            _ => debug!(
                parent: &self.span,
                op,
                rows = result.row_count(),
                affected = result.affected_rows(),
                "statement finished"
            ),
        }
    }

    /// Close a session whose rollback already failed. Unlike `disconnect`, no
    /// further ROLLBACK is sent.
    async fn close_session(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.close().await {
                debug!(parent: &self.span, error = %err, "driver reported an error while closing");
            }
        }
        self.transition(ConnectionState::Disconnected);
    }

    /// Drop a handle whose session can no longer be trusted; no I/O is attempted.
    fn discard_handle(&mut self) {
        if self.handle.take().is_some() {
            warn!(parent: &self.span, state = ?self.state, "discarding broken session");
        }
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(parent: &self.span, from = ?self.state, to = ?next, "connection state changed");
            self.state = next;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state == ConnectionState::InTransaction {
            warn!(
                parent: &self.span,
                "connection dropped with an open transaction; the server will roll it back"
            );
        }
    }
}
