//! Drains driver row sources into [`QueryResult`]s.
//!
//! This is the only place that interprets raw cell bytes. Values are decoded by the
//! column's declared type; text versus binary is decided by the column charset,
//! never by looking at the bytes.

use super::{QueryFailure, QueryResult, ResultSet};
use crate::driver::{ColumnKind, DriverError, ExecOutcome, RawColumn, RowSource};
use crate::types::RowValues;

/// Read every row of `source` into memory.
///
/// All or nothing: if the driver fails or a cell cannot be decoded, the rows read so
/// far are dropped and a failed result is returned instead.
pub async fn materialize_rows(source: &mut (dyn RowSource + '_)) -> QueryResult {
    let columns = match source.columns().await {
        Ok(columns) => columns,
        Err(err) => return QueryResult::Failed(failure_while_draining(err)),
    };

    let names = columns.iter().map(|c| c.name.clone()).collect();
    let mut result_set = ResultSet::new(names);

    loop {
        let raw = match source.next_row().await {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(err) => return QueryResult::Failed(failure_while_draining(err)),
        };

        if raw.len() != columns.len() {
            return QueryResult::Failed(QueryFailure::drain(format!(
                "row {} has {} cells but the result has {} columns",
                result_set.row_count() + 1,
                raw.len(),
                columns.len()
            )));
        }

        let values = match columns
            .iter()
            .zip(raw)
            .map(|(column, cell)| decode_cell(column, cell))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(values) => values,
            Err(msg) => return QueryResult::Failed(QueryFailure::drain(msg)),
        };

        if let Err(err) = result_set.add_row_values(values) {
            return QueryResult::Failed(QueryFailure::drain(err.to_string()));
        }
    }

    QueryResult::Rows(result_set)
}

/// Result of a statement that returned no rows.
#[must_use]
pub fn materialize_outcome(outcome: ExecOutcome) -> QueryResult {
    QueryResult::Affected {
        affected_rows: outcome.affected_rows,
        last_insert_id: outcome.last_insert_id,
    }
}

/// Failure for an error raised before the statement produced anything to read.
pub(crate) fn failure_before_read(err: DriverError) -> QueryFailure {
    match err {
        DriverError::Server {
            code,
            sqlstate,
            message,
        } => QueryFailure::query(code, sqlstate, message),
        DriverError::ConnectionLost(msg) | DriverError::Other(msg) => {
            QueryFailure::connection_lost(msg)
        }
    }
}

fn failure_while_draining(err: DriverError) -> QueryFailure {
    match err {
        DriverError::Server {
            code,
            sqlstate,
            message,
        } => QueryFailure::query(code, sqlstate, message),
        DriverError::ConnectionLost(msg) | DriverError::Other(msg) => QueryFailure::drain(msg),
    }
}

fn decode_cell(column: &RawColumn, cell: Option<Vec<u8>>) -> Result<RowValues, String> {
    let Some(bytes) = cell else {
        return Ok(RowValues::Null);
    };

    match column.kind {
        ColumnKind::Null => Ok(RowValues::Null),
        ColumnKind::TinyInt
        | ColumnKind::SmallInt
        | ColumnKind::MediumInt
        | ColumnKind::Int
        | ColumnKind::BigInt
        | ColumnKind::Year => decode_integer(column, &bytes),
        ColumnKind::Bit => decode_bit(column, &bytes),
        ColumnKind::Float | ColumnKind::Double => decode_float(column, &bytes),
        ColumnKind::Decimal
        | ColumnKind::Date
        | ColumnKind::Time
        | ColumnKind::DateTime
        | ColumnKind::Timestamp
        | ColumnKind::Json
        | ColumnKind::Enum
        | ColumnKind::Set => decode_text(column, bytes),
        kind if kind.is_string_like() => {
            if column.is_binary() {
                Ok(RowValues::Blob(bytes))
            } else {
                decode_text(column, bytes)
            }
        }
        _ => Ok(RowValues::Blob(bytes)),
    }
}

fn cell_str<'a>(column: &RawColumn, bytes: &'a [u8]) -> Result<&'a str, String> {
    std::str::from_utf8(bytes)
        .map_err(|e| format!("column `{}`: value is not valid UTF-8: {e}", column.name))
}

fn decode_integer(column: &RawColumn, bytes: &[u8]) -> Result<RowValues, String> {
    let text = cell_str(column, bytes)?;
    if let Ok(value) = text.parse::<i64>() {
        return Ok(RowValues::Int(value));
    }
    // BIGINT UNSIGNED above i64::MAX keeps its exact digits.
    if column.unsigned && text.parse::<u64>().is_ok() {
        return Ok(RowValues::Text(text.to_string()));
    }
    Err(format!(
        "column `{}`: {text:?} is not an integer",
        column.name
    ))
}

fn decode_bit(column: &RawColumn, bytes: &[u8]) -> Result<RowValues, String> {
    if bytes.len() > 8 {
        return Err(format!(
            "column `{}`: BIT value of {} bytes exceeds 64 bits",
            column.name,
            bytes.len()
        ));
    }
    let value = bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    Ok(i64::try_from(value).map_or_else(|_| RowValues::Text(value.to_string()), RowValues::Int))
}

fn decode_float(column: &RawColumn, bytes: &[u8]) -> Result<RowValues, String> {
    let text = cell_str(column, bytes)?;
    text.trim()
        .parse::<f64>()
        .map(RowValues::Float)
        .map_err(|_| format!("column `{}`: {text:?} is not a number", column.name))
}

fn decode_text(column: &RawColumn, bytes: Vec<u8>) -> Result<RowValues, String> {
    String::from_utf8(bytes)
        .map(RowValues::Text)
        .map_err(|e| format!("column `{}`: value is not valid UTF-8: {e}", column.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{BINARY_CHARSET_NR, UTF8MB4_CHARSET_NR};

    fn col(name: &str, kind: ColumnKind) -> RawColumn {
        RawColumn::new(name, kind, UTF8MB4_CHARSET_NR)
    }

    fn cell(text: &str) -> Option<Vec<u8>> {
        Some(text.as_bytes().to_vec())
    }

    #[test]
    fn decodes_by_declared_type() {
        assert_eq!(
            decode_cell(&col("a", ColumnKind::BigInt), cell("-42")),
            Ok(RowValues::Int(-42))
        );
        assert_eq!(
            decode_cell(&col("a", ColumnKind::Double), cell("1.5")),
            Ok(RowValues::Float(1.5))
        );
        assert_eq!(
            decode_cell(&col("a", ColumnKind::Float), cell("1e+20")),
            Ok(RowValues::Float(1e20))
        );
        assert_eq!(
            decode_cell(&col("a", ColumnKind::Decimal), cell("10.50")),
            Ok(RowValues::Text("10.50".into()))
        );
        assert_eq!(
            decode_cell(&col("a", ColumnKind::DateTime), cell("2024-01-02 03:04:05")),
            Ok(RowValues::Text("2024-01-02 03:04:05".into()))
        );
        assert_eq!(
            decode_cell(&col("a", ColumnKind::VarChar), None),
            Ok(RowValues::Null)
        );
    }

    #[test]
    fn binary_versus_text_follows_charset() {
        let text_col = RawColumn::new("t", ColumnKind::Blob, UTF8MB4_CHARSET_NR);
        let blob_col = RawColumn::new("b", ColumnKind::Blob, BINARY_CHARSET_NR);
        assert_eq!(
            decode_cell(&text_col, cell("hello")),
            Ok(RowValues::Text("hello".into()))
        );
        // Valid UTF-8 in a binary column is still binary.
        assert_eq!(
            decode_cell(&blob_col, cell("hello")),
            Ok(RowValues::Blob(b"hello".to_vec()))
        );
    }

    #[test]
    fn unsigned_overflow_keeps_digits() {
        let column = col("u", ColumnKind::BigInt).unsigned();
        assert_eq!(
            decode_cell(&column, cell("18446744073709551615")),
            Ok(RowValues::Text("18446744073709551615".into()))
        );
        assert!(decode_cell(&col("s", ColumnKind::BigInt), cell("18446744073709551615")).is_err());
    }

    #[test]
    fn bit_columns_are_big_endian() {
        assert_eq!(
            decode_cell(&col("f", ColumnKind::Bit), Some(vec![0x01, 0x02])),
            Ok(RowValues::Int(258))
        );
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(decode_cell(&col("i", ColumnKind::Int), cell("abc")).is_err());
        assert!(decode_cell(&col("f", ColumnKind::Double), cell("x1")).is_err());
        assert!(decode_cell(&col("v", ColumnKind::VarChar), Some(vec![0xFF, 0xFE])).is_err());
    }
}
