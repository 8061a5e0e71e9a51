//! Client-side data access for MySQL/MariaDB.
//!
//! A [`Connection`] runs plain SQL text through an explicit state machine and
//! materializes every result into a [`QueryResult`]. [`StatementBuilder`] renders
//! escaped INSERT/UPDATE/SELECT/DELETE statements, and [`MiddlewarePool`] shares a
//! bounded set of connections between tasks.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod escape;
pub mod pool;
pub mod prelude;
pub mod query_builder;
pub mod results;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, PoolOptions};
pub use connection::{Connection, ConnectionState};
pub use error::SqlMiddlewareDbError;
pub use escape::{escape_bytes, escape_string};
pub use pool::{MiddlewarePool, MiddlewarePoolConnection, PoolStatus};
pub use query_builder::{StatementBuilder, validate_identifier};
pub use results::{CustomDbRow, FailureKind, QueryFailure, QueryResult, ResultSet};
pub use types::{Charset, RowValues};

#[cfg(feature = "mysql")]
pub use driver::mysql::MysqlConnector;
