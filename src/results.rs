//! Materialized query results and their canonical encoding.

pub mod encoding;
pub mod materialize;
mod query_result;
mod result_set;
mod row;

pub use query_result::{FailureKind, QueryFailure, QueryResult};
pub use result_set::ResultSet;
pub use row::CustomDbRow;
