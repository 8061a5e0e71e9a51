use thiserror::Error;

use crate::driver::DriverError;

#[derive(Debug, Error)]
pub enum SqlMiddlewareDbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connect error: {0}")]
    ConnectError(String),

    #[error("Connection is not connected; {0} requires an open connection")]
    NotConnected(&'static str),

    #[error("Transaction state error: {0}")]
    StateError(String),

    #[error("Query error{}: {message}", format_code(.code))]
    QueryError {
        code: Option<u16>,
        sqlstate: Option<String>,
        message: String,
    },

    #[error("Result drain error: {0}")]
    DrainError(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Unsafe identifier rejected: {0:?}")]
    IdentifierError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error(transparent)]
    SerializationError(#[from] serde_json::Error),

    #[error("Other database error: {0}")]
    Other(String),
}

impl From<DriverError> for SqlMiddlewareDbError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Server {
                code,
                sqlstate,
                message,
            } => SqlMiddlewareDbError::QueryError {
                code,
                sqlstate,
                message,
            },
            DriverError::ConnectionLost(msg) => SqlMiddlewareDbError::ConnectionLost(msg),
            DriverError::Other(msg) => SqlMiddlewareDbError::Other(msg),
        }
    }
}

fn format_code(code: &Option<u16>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl SqlMiddlewareDbError {
    /// True for failures that concern the connection itself rather than a single statement.
    ///
    /// Callers use this to decide between reconnecting and retrying the statement.
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            SqlMiddlewareDbError::ConnectError(_)
                | SqlMiddlewareDbError::ConnectionLost(_)
                | SqlMiddlewareDbError::NotConnected(_)
        )
    }
}
