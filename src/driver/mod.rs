//! The seam between the connection engine and a concrete client driver.
//!
//! A [`Connector`] opens [`DriverHandle`]s; a handle runs statements and hands
//! back a [`RowSource`] for row-returning ones. Everything above this module works
//! only with these traits and the raw column/row types defined here.

#[cfg(feature = "mysql")]
pub mod mysql;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConnectionConfig;

/// Character set number the server reports for binary strings.
pub const BINARY_CHARSET_NR: u16 = 63;
/// `utf8mb4_general_ci`
pub const UTF8MB4_CHARSET_NR: u16 = 45;

/// Failures reported by a driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The server rejected the statement; the connection is still usable.
    #[error("server error: {message}")]
    Server {
        code: Option<u16>,
        sqlstate: Option<String>,
        message: String,
    },
    /// The link to the server is gone; the handle must be discarded.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("driver error: {0}")]
    Other(String),
}

impl DriverError {
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DriverError::ConnectionLost(_))
    }
}

/// Declared column type, as reported in result-set metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Null,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Year,
    Bit,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Timestamp,
    Char,
    VarChar,
    Text,
    Blob,
    Json,
    Enum,
    Set,
    Geometry,
}

impl ColumnKind {
    /// Character-string kinds whose payload is text or bytes depending on the charset.
    #[must_use]
    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            ColumnKind::Char | ColumnKind::VarChar | ColumnKind::Text | ColumnKind::Blob
        )
    }
}

/// Result-set column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub unsigned: bool,
    /// Character set number of the column; [`BINARY_CHARSET_NR`] marks byte strings.
    pub charset_nr: u16,
}

impl RawColumn {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind, charset_nr: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            unsigned: false,
            charset_nr,
        }
    }

    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.charset_nr == BINARY_CHARSET_NR
    }
}

/// One row in text-protocol form: `None` is SQL NULL, otherwise the value's bytes.
pub type RawRow = Vec<Option<Vec<u8>>>;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

/// Opens driver handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session with the server described by `config`.
    ///
    /// Timeouts are enforced by the caller.
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverHandle>, DriverError>;
}

/// One live session with the server. Owned by exactly one `Connection`.
#[async_trait]
pub trait DriverHandle: Send {
    /// Run a row-returning statement; rows are pulled through the returned source.
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> Result<Box<dyn RowSource + 'a>, DriverError>;

    /// Run a statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome, DriverError>;

    async fn ping(&mut self) -> Result<(), DriverError>;

    /// Close the session.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Rows of a single result set, read in server order.
#[async_trait]
pub trait RowSource: Send {
    /// Column metadata, available before the first row is read.
    async fn columns(&mut self) -> Result<Vec<RawColumn>, DriverError>;

    /// Next row, or `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<RawRow>, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_is_decided_by_charset_alone() {
        let text = RawColumn::new("t", ColumnKind::Blob, UTF8MB4_CHARSET_NR);
        let bytes = RawColumn::new("b", ColumnKind::VarChar, BINARY_CHARSET_NR);
        assert!(text.kind.is_string_like() && !text.is_binary());
        assert!(bytes.kind.is_string_like() && bytes.is_binary());
        assert!(!ColumnKind::Json.is_string_like());
    }
}
