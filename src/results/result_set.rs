use std::collections::HashMap;
use std::sync::Arc;

use super::row::{CustomDbRow, build_index_cache};
use crate::error::SqlMiddlewareDbError;
use crate::types::RowValues;

/// A result set from a database query
///
/// Holds the rows of a SELECT-style statement in server order. Column names and
/// the name lookup cache are shared by every row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    column_names: Arc<Vec<String>>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ResultSet {
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        Self::with_capacity(column_names, 0)
    }

    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(column_names: Vec<String>, capacity: usize) -> Self {
        let column_index_cache = build_index_cache(&column_names);
        Self {
            results: Vec::with_capacity(capacity),
            column_names: Arc::new(column_names),
            column_index_cache,
        }
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Add a row to the result set
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ParameterError` if the number of values does not
    /// match the number of columns.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) -> Result<(), SqlMiddlewareDbError> {
        if row_values.len() != self.column_names.len() {
            return Err(SqlMiddlewareDbError::ParameterError(format!(
                "row has {} values but the result set has {} columns",
                row_values.len(),
                self.column_names.len()
            )));
        }
        self.results.push(CustomDbRow::with_cache(
            Arc::clone(&self.column_names),
            row_values,
            Arc::clone(&self.column_index_cache),
        ));
        Ok(())
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CustomDbRow> {
        self.results.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a CustomDbRow;
    type IntoIter = std::slice::Iter<'a, CustomDbRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
