use super::{CustomDbRow, ResultSet};
use crate::error::SqlMiddlewareDbError;

/// Why a statement did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The server rejected the statement (syntax, constraint, permission, ...).
    Query {
        code: Option<u16>,
        sqlstate: Option<String>,
    },
    /// Reading the result failed part way; rows already read were discarded.
    Drain,
    /// The connection dropped before the statement completed.
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl QueryFailure {
    #[must_use]
    pub fn query(code: Option<u16>, sqlstate: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Query { code, sqlstate },
            message: message.into(),
        }
    }

    #[must_use]
    pub fn drain(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Drain,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ConnectionLost,
            message: message.into(),
        }
    }

    /// True when the connection that ran the statement can no longer be used.
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        !matches!(self.kind, FailureKind::Query { .. })
    }
}

impl From<QueryFailure> for SqlMiddlewareDbError {
    fn from(failure: QueryFailure) -> Self {
        match failure.kind {
            FailureKind::Query { code, sqlstate } => SqlMiddlewareDbError::QueryError {
                code,
                sqlstate,
                message: failure.message,
            },
            FailureKind::Drain => SqlMiddlewareDbError::DrainError(failure.message),
            FailureKind::ConnectionLost => SqlMiddlewareDbError::ConnectionLost(failure.message),
        }
    }
}

/// Outcome of executing one statement.
///
/// SQL-level failures are values, not errors: a caller always gets one of these
/// back from an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows of a SELECT-style statement.
    Rows(ResultSet),
    /// Outcome of a mutation.
    Affected {
        affected_rows: u64,
        last_insert_id: Option<u64>,
    },
    Failed(QueryFailure),
}

impl QueryResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, QueryResult::Failed(_))
    }

    /// The failure message, or an empty string on success.
    #[must_use]
    pub fn error_message(&self) -> &str {
        match self {
            QueryResult::Failed(failure) => &failure.message,
            _ => "",
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&QueryFailure> {
        match self {
            QueryResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Rows changed by a mutation; zero for row-returning and failed statements.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        match self {
            QueryResult::Affected { affected_rows, .. } => *affected_rows,
            _ => 0,
        }
    }

    #[must_use]
    pub fn last_insert_id(&self) -> Option<u64> {
        match self {
            QueryResult::Affected { last_insert_id, .. } => *last_insert_id,
            _ => None,
        }
    }

    /// Rows returned; zero for mutations and failed statements.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.result_set().map_or(0, ResultSet::row_count)
    }

    #[must_use]
    pub fn rows(&self) -> &[CustomDbRow] {
        match self {
            QueryResult::Rows(rs) => &rs.results,
            _ => &[],
        }
    }

    #[must_use]
    pub fn result_set(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Rows(rs) => Some(rs),
            _ => None,
        }
    }

    /// Turn a failed result into an error so it can be propagated with `?`.
    ///
    /// # Errors
    /// Returns the `QueryError`, `DrainError`, or `ConnectionLost` matching the failure.
    pub fn into_checked(self) -> Result<Self, SqlMiddlewareDbError> {
        match self {
            QueryResult::Failed(failure) => Err(failure.into()),
            other => Ok(other),
        }
    }

    /// Canonical encoding of the rows (see [`crate::results::encoding`]).
    ///
    /// Mutations and failed statements encode as an empty array.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::SerializationError` if encoding fails.
    pub fn to_canonical_json(&self) -> Result<String, SqlMiddlewareDbError> {
        match self {
            QueryResult::Rows(rs) => rs.to_canonical_json(),
            _ => Ok("[]".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    #[test]
    fn flat_view_of_each_variant() {
        let mut rs = ResultSet::new(vec!["id".into()]);
        rs.add_row_values(vec![RowValues::Int(1)]).unwrap();
        let rows = QueryResult::Rows(rs);
        assert!(rows.is_success());
        assert_eq!(rows.row_count(), 1);
        assert_eq!(rows.affected_rows(), 0);
        assert_eq!(rows.error_message(), "");

        let affected = QueryResult::Affected {
            affected_rows: 3,
            last_insert_id: Some(9),
        };
        assert_eq!(affected.affected_rows(), 3);
        assert_eq!(affected.row_count(), 0);
        assert!(affected.rows().is_empty());
        assert_eq!(affected.to_canonical_json().unwrap(), "[]");

        let failed = QueryResult::Failed(QueryFailure::query(
            Some(1064),
            Some("42000".into()),
            "syntax",
        ));
        assert!(!failed.is_success());
        assert_eq!(failed.error_message(), "syntax");
        assert!(matches!(
            failed.into_checked(),
            Err(SqlMiddlewareDbError::QueryError {
                code: Some(1064),
                ..
            })
        ));
    }
}
