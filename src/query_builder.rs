//! Builds INSERT/UPDATE/SELECT/DELETE text from table and column names plus values.
//!
//! Identifiers cannot be bound as parameters, so they are checked against a strict
//! allow-list and back-quoted. Values are rendered as literals through the escaper.
//! Predicate and ORDER BY/LIMIT fragments are appended as given; the builder does
//! not parse them, so they must never contain unescaped user input.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlMiddlewareDbError;
use crate::escape::escape_string;
use crate::types::{Charset, RowValues, float_literal};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"));

/// Check that `name` is safe to place in identifier context.
///
/// # Errors
/// Returns `SqlMiddlewareDbError::IdentifierError` when `name` is empty or contains
/// anything other than ASCII letters, digits, and underscores.
pub fn validate_identifier(name: &str) -> Result<&str, SqlMiddlewareDbError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(SqlMiddlewareDbError::IdentifierError(name.to_string()))
    }
}

/// Statement builder bound to the connection charset used for escaping.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementBuilder {
    charset: Charset,
}

impl StatementBuilder {
    #[must_use]
    pub fn new(charset: Charset) -> Self {
        Self { charset }
    }

    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// `INSERT INTO table (cols) VALUES (vals)`
    ///
    /// # Errors
    /// Returns `IdentifierError` for an unsafe table or column name, and
    /// `ParameterError` for an empty column list or a value that has no literal form.
    pub fn insert(
        &self,
        table: &str,
        values: &[(&str, RowValues)],
    ) -> Result<String, SqlMiddlewareDbError> {
        let table = quote_identifier(table)?;
        if values.is_empty() {
            return Err(SqlMiddlewareDbError::ParameterError(
                "insert requires at least one column".into(),
            ));
        }

        let mut columns = Vec::with_capacity(values.len());
        let mut literals = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(quote_identifier(column)?);
            literals.push(self.render_value(value)?);
        }

        Ok(format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            literals.join(", ")
        ))
    }

    /// `UPDATE table SET col = val, ... [WHERE predicate]`
    ///
    /// # Errors
    /// Returns `IdentifierError` for an unsafe table or column name, and
    /// `ParameterError` for an empty assignment list or a value that has no literal form.
    pub fn update(
        &self,
        table: &str,
        assignments: &[(&str, RowValues)],
        predicate: Option<&str>,
    ) -> Result<String, SqlMiddlewareDbError> {
        let table = quote_identifier(table)?;
        if assignments.is_empty() {
            return Err(SqlMiddlewareDbError::ParameterError(
                "update requires at least one assignment".into(),
            ));
        }

        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            sets.push(format!(
                "{} = {}",
                quote_identifier(column)?,
                self.render_value(value)?
            ));
        }

        let mut sql = format!("UPDATE {table} SET {}", sets.join(", "));
        push_where(&mut sql, predicate);
        Ok(sql)
    }

    /// `SELECT cols FROM table [WHERE predicate] [tail]`
    ///
    /// An empty column list selects `*`. `tail` carries ORDER BY / LIMIT text.
    ///
    /// # Errors
    /// Returns `IdentifierError` for an unsafe table or column name.
    pub fn select(
        &self,
        table: &str,
        columns: &[&str],
        predicate: Option<&str>,
        tail: Option<&str>,
    ) -> Result<String, SqlMiddlewareDbError> {
        let table = quote_identifier(table)?;
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {projection} FROM {table}");
        push_where(&mut sql, predicate);
        if let Some(tail) = non_blank(tail) {
            let _ = write!(sql, " {tail}");
        }
        Ok(sql)
    }

    /// `DELETE FROM table [WHERE predicate]`
    ///
    /// # Errors
    /// Returns `IdentifierError` for an unsafe table name.
    pub fn delete(
        &self,
        table: &str,
        predicate: Option<&str>,
    ) -> Result<String, SqlMiddlewareDbError> {
        let mut sql = format!("DELETE FROM {}", quote_identifier(table)?);
        push_where(&mut sql, predicate);
        Ok(sql)
    }

    /// Render a single value as a SQL literal.
    ///
    /// # Errors
    /// Returns `ParameterError` for non-finite floats and for text the charset cannot carry.
    pub fn render_value(&self, value: &RowValues) -> Result<String, SqlMiddlewareDbError> {
        match value {
            RowValues::Null => Ok("NULL".to_string()),
            RowValues::Int(i) => Ok(i.to_string()),
            RowValues::Float(f) => render_float(*f),
            RowValues::Text(s) => Ok(format!("'{}'", escape_string(s, self.charset)?)),
            RowValues::Blob(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2 + 3);
                hex.push_str("X'");
                for byte in bytes {
                    let _ = write!(hex, "{byte:02X}");
                }
                hex.push('\'');
                Ok(hex)
            }
        }
    }
}

fn quote_identifier(name: &str) -> Result<String, SqlMiddlewareDbError> {
    validate_identifier(name).map(|n| format!("`{n}`"))
}

fn render_float(value: f64) -> Result<String, SqlMiddlewareDbError> {
    if !value.is_finite() {
        return Err(SqlMiddlewareDbError::ParameterError(format!(
            "float {value} has no SQL literal"
        )));
    }
    // The decimal point keeps the server from reading an exact DECIMAL/integer.
    Ok(float_literal(value))
}

fn non_blank(fragment: Option<&str>) -> Option<&str> {
    fragment.map(str::trim).filter(|f| !f.is_empty())
}

fn push_where(sql: &mut String, predicate: Option<&str>) {
    if let Some(predicate) = non_blank(predicate) {
        let _ = write!(sql, " WHERE {predicate}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> StatementBuilder {
        StatementBuilder::new(Charset::Utf8mb4)
    }

    #[test]
    fn builds_insert() {
        let sql = builder()
            .insert(
                "users",
                &[
                    ("id", RowValues::Int(7)),
                    ("name", RowValues::Text("O'Brien".into())),
                    ("score", RowValues::Float(2.0)),
                    ("avatar", RowValues::Blob(vec![0xDE, 0xAD])),
                    ("deleted_at", RowValues::Null),
                ],
            )
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `users` (`id`, `name`, `score`, `avatar`, `deleted_at`) \
             VALUES (7, 'O\\'Brien', 2.0, X'DEAD', NULL)"
        );
    }

    #[test]
    fn builds_update_with_predicate() {
        let sql = builder()
            .update(
                "users",
                &[("name", RowValues::Text("x".into()))],
                Some("id = 7"),
            )
            .unwrap();
        assert_eq!(sql, "UPDATE `users` SET `name` = 'x' WHERE id = 7");
    }

    #[test]
    fn builds_select_variants() {
        let b = builder();
        assert_eq!(b.select("t", &[], None, None).unwrap(), "SELECT * FROM `t`");
        assert_eq!(
            b.select("t", &["a", "b"], Some("a > 1"), Some("ORDER BY a LIMIT 10"))
                .unwrap(),
            "SELECT `a`, `b` FROM `t` WHERE a > 1 ORDER BY a LIMIT 10"
        );
        assert_eq!(
            b.select("t", &["a"], Some("   "), Some("")).unwrap(),
            "SELECT `a` FROM `t`"
        );
    }

    #[test]
    fn builds_delete() {
        assert_eq!(
            builder().delete("t", Some("id = 1")).unwrap(),
            "DELETE FROM `t` WHERE id = 1"
        );
        assert_eq!(builder().delete("t", None).unwrap(), "DELETE FROM `t`");
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let b = builder();
        for bad in ["user name", "users;", "users'", "us`ers", "", "a.b", "t\"x"] {
            assert!(
                matches!(
                    b.select(bad, &[], None, None),
                    Err(SqlMiddlewareDbError::IdentifierError(_))
                ),
                "table {bad:?} should be rejected"
            );
            assert!(matches!(
                b.insert("t", &[(bad, RowValues::Int(1))]),
                Err(SqlMiddlewareDbError::IdentifierError(_))
            ));
            assert!(matches!(
                b.update("t", &[(bad, RowValues::Int(1))], None),
                Err(SqlMiddlewareDbError::IdentifierError(_))
            ));
            assert!(matches!(
                b.delete(bad, None),
                Err(SqlMiddlewareDbError::IdentifierError(_))
            ));
        }
    }

    #[test]
    fn rejects_empty_assignments_and_non_finite_floats() {
        let b = builder();
        assert!(matches!(
            b.insert("t", &[]),
            Err(SqlMiddlewareDbError::ParameterError(_))
        ));
        assert!(matches!(
            b.update("t", &[], None),
            Err(SqlMiddlewareDbError::ParameterError(_))
        ));
        assert!(matches!(
            b.insert("t", &[("f", RowValues::Float(f64::NAN))]),
            Err(SqlMiddlewareDbError::ParameterError(_))
        ));
    }

    #[test]
    fn floats_keep_their_fraction() {
        let b = builder();
        assert_eq!(b.render_value(&RowValues::Float(3.0)).unwrap(), "3.0");
        assert_eq!(b.render_value(&RowValues::Float(-0.25)).unwrap(), "-0.25");
        assert_eq!(b.render_value(&RowValues::Float(1e300)).unwrap(), "1.0e300");
    }
}
