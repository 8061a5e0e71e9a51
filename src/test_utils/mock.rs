use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::driver::{
    ColumnKind, Connector, DriverError, DriverHandle, ExecOutcome, RawColumn, RawRow, RowSource,
    UTF8MB4_CHARSET_NR,
};

/// Scripted answer to one SQL string.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Rows {
        columns: Vec<RawColumn>,
        rows: Vec<RawRow>,
    },
    Affected(ExecOutcome),
    ServerError {
        code: u16,
        sqlstate: String,
        message: String,
    },
    /// Send `rows`, then lose the connection before the result set ends.
    DropMidRows {
        columns: Vec<RawColumn>,
        rows: Vec<RawRow>,
    },
    /// Lose the connection as soon as the statement is sent.
    DropConnection,
}

impl MockResponse {
    /// Text-protocol rows; `None` cells are NULL.
    #[must_use]
    pub fn rows(columns: Vec<RawColumn>, rows: Vec<Vec<Option<&str>>>) -> Self {
        MockResponse::Rows {
            columns,
            rows: rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|cell| cell.map(|text| text.as_bytes().to_vec()))
                        .collect()
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn affected(affected_rows: u64, last_insert_id: Option<u64>) -> Self {
        MockResponse::Affected(ExecOutcome {
            affected_rows,
            last_insert_id,
        })
    }

    #[must_use]
    pub fn server_error(code: u16, sqlstate: &str, message: &str) -> Self {
        MockResponse::ServerError {
            code,
            sqlstate: sqlstate.to_string(),
            message: message.to_string(),
        }
    }
}

/// A `VARCHAR` column in `utf8mb4`.
#[must_use]
pub fn text_column(name: &str) -> RawColumn {
    RawColumn::new(name, ColumnKind::VarChar, UTF8MB4_CHARSET_NR)
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    delays: HashMap<String, Duration>,
    statements: Vec<(u64, String)>,
    opened: u64,
    closed: u64,
    live: u64,
    peak_live: u64,
    connect_error: Option<String>,
    connect_delay: Option<Duration>,
    severed: bool,
}

/// In-memory server shared by every handle it opens.
///
/// Statements are matched by exact text against the scripted responses.
/// Unscripted statements succeed: queries return no rows, everything else affects
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Script the answer for `sql`.
    pub fn on(&self, sql: &str, response: MockResponse) -> &Self {
        self.state().responses.insert(sql.to_string(), response);
        self
    }

    /// Make the server take `delay` to answer `sql`.
    pub fn delay(&self, sql: &str, delay: Duration) -> &Self {
        self.state().delays.insert(sql.to_string(), delay);
        self
    }

    /// Make every following connect attempt fail with `message`.
    pub fn fail_connect(&self, message: &str) {
        self.state().connect_error = Some(message.to_string());
    }

    /// Delay every following connect attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = Some(delay);
    }

    /// Cut the network: live handles and new connects fail until [`MockConnector::restore`].
    pub fn sever(&self) {
        self.state().severed = true;
    }

    pub fn restore(&self) {
        let mut state = self.state();
        state.severed = false;
        state.connect_error = None;
    }

    /// Every statement sent to the server, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Statements sent on one session; sessions are numbered from 1 in connect order.
    #[must_use]
    pub fn statements_for(&self, session: u64) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .filter(|(id, _)| *id == session)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Sessions successfully opened.
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.state().opened
    }

    /// Sessions closed cleanly by the client.
    #[must_use]
    pub fn closed(&self) -> u64 {
        self.state().closed
    }

    /// Sessions whose handle is still alive on the client side.
    #[must_use]
    pub fn live(&self) -> u64 {
        self.state().live
    }

    /// Most sessions ever alive at the same time.
    #[must_use]
    pub fn peak_live(&self) -> u64 {
        self.state().peak_live
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _config: &ConnectionConfig) -> Result<Box<dyn DriverHandle>, DriverError> {
        let delay = self.state().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.severed {
            return Err(DriverError::ConnectionLost("network is unreachable".into()));
        }
        if let Some(message) = &state.connect_error {
            return Err(DriverError::Server {
                code: Some(1045),
                sqlstate: Some("28000".into()),
                message: message.clone(),
            });
        }
        state.opened += 1;
        state.live += 1;
        state.peak_live = state.peak_live.max(state.live);
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            session: state.opened,
            alive: true,
        }))
    }
}

struct MockHandle {
    state: Arc<Mutex<MockState>>,
    session: u64,
    alive: bool,
}

impl MockHandle {
    async fn pause(&self, sql: &str) {
        let delay = lock(&self.state).delays.get(sql).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn send(&mut self, sql: &str) -> Result<Option<MockResponse>, DriverError> {
        let mut state = lock(&self.state);
        state.statements.push((self.session, sql.to_string()));
        if !self.alive || state.severed {
            self.alive = false;
            return Err(lost());
        }
        Ok(state.responses.get(sql).cloned())
    }
}

fn lost() -> DriverError {
    DriverError::ConnectionLost("server has gone away".into())
}

#[async_trait]
impl DriverHandle for MockHandle {
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> Result<Box<dyn RowSource + 'a>, DriverError> {
        self.pause(sql).await;
        let (columns, rows, fails) = match self.send(sql)? {
            Some(MockResponse::Rows { columns, rows }) => (columns, rows, false),
            Some(MockResponse::DropMidRows { columns, rows }) => {
                self.alive = false;
                (columns, rows, true)
            }
            Some(MockResponse::ServerError {
                code,
                sqlstate,
                message,
            }) => {
                return Err(DriverError::Server {
                    code: Some(code),
                    sqlstate: Some(sqlstate),
                    message,
                });
            }
            Some(MockResponse::DropConnection) => {
                self.alive = false;
                return Err(lost());
            }
            Some(MockResponse::Affected(_)) | None => (Vec::new(), Vec::new(), false),
        };
        Ok(Box::new(MockRows {
            columns,
            rows: rows.into_iter(),
            fails,
        }))
    }

    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome, DriverError> {
        self.pause(sql).await;
        match self.send(sql)? {
            Some(MockResponse::Affected(outcome)) => Ok(outcome),
            Some(MockResponse::ServerError {
                code,
                sqlstate,
                message,
            }) => Err(DriverError::Server {
                code: Some(code),
                sqlstate: Some(sqlstate),
                message,
            }),
            Some(MockResponse::DropConnection | MockResponse::DropMidRows { .. }) => {
                self.alive = false;
                Err(lost())
            }
            Some(MockResponse::Rows { .. }) | None => Ok(ExecOutcome::default()),
        }
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        if !self.alive || lock(&self.state).severed {
            return Err(lost());
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        lock(&self.state).closed += 1;
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.live = state.live.saturating_sub(1);
    }
}

struct MockRows {
    columns: Vec<RawColumn>,
    rows: std::vec::IntoIter<RawRow>,
    fails: bool,
}

#[async_trait]
impl RowSource for MockRows {
    async fn columns(&mut self) -> Result<Vec<RawColumn>, DriverError> {
        Ok(self.columns.clone())
    }

    async fn next_row(&mut self) -> Result<Option<RawRow>, DriverError> {
        match self.rows.next() {
            Some(row) => Ok(Some(row)),
            None if self.fails => Err(lost()),
            None => Ok(None),
        }
    }
}
