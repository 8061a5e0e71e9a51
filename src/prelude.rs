//! Convenient imports for common functionality.

pub use crate::config::{ConnectionConfig, PoolOptions};
pub use crate::connection::{Connection, ConnectionState};
pub use crate::driver::Connector;
pub use crate::error::SqlMiddlewareDbError;
pub use crate::pool::{MiddlewarePool, MiddlewarePoolConnection};
pub use crate::query_builder::StatementBuilder;
pub use crate::results::{CustomDbRow, QueryResult, ResultSet};
pub use crate::types::{Charset, RowValues};

#[cfg(feature = "mysql")]
pub use crate::driver::mysql::MysqlConnector;
