//! Canonical JSON encoding of result rows.
//!
//! The document is an array of row objects in server order. Each object's keys are
//! the column names in column order, and values keep their type:
//!
//! | value           | encoding                         |
//! |-----------------|----------------------------------|
//! | NULL            | `null`                           |
//! | integer         | JSON integer                     |
//! | float           | JSON number with a decimal point (`2.0`, `1.0e300`) |
//! | non-finite float| `{"$float": "NaN" \| "inf" \| "-inf"}` |
//! | text            | JSON string                      |
//! | binary          | `{"$binary": "<base64>"}`        |
//!
//! The format has no version field and does not change.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::{CustomDbRow, ResultSet};
use crate::error::SqlMiddlewareDbError;
use crate::types::{RowValues, float_literal};

const BINARY_TAG: &str = "$binary";
const FLOAT_TAG: &str = "$float";

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Null => serializer.serialize_unit(),
            RowValues::Int(value) => serializer.serialize_i64(*value),
            RowValues::Float(value) if value.is_finite() => {
                // serde_json would print `1e300`; write the literal as-is instead.
                RawValue::from_string(float_literal(*value))
                    .map_err(<S::Error as ser::Error>::custom)?
                    .serialize(serializer)
            }
            RowValues::Float(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(FLOAT_TAG, non_finite_name(*value))?;
                map.end()
            }
            RowValues::Text(value) => serializer.serialize_str(value),
            RowValues::Blob(bytes) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BINARY_TAG, &STANDARD.encode(bytes))?;
                map.end()
            }
        }
    }
}

fn non_finite_name(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

impl Serialize for CustomDbRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.results)
    }
}

impl<'de> Deserialize<'de> for RowValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RowValuesVisitor)
    }
}

struct RowValuesVisitor;

impl<'de> Visitor<'de> for RowValuesVisitor {
    type Value = RowValues;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a number, a string, or a tagged $binary/$float object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RowValues, E> {
        Ok(RowValues::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RowValues, E> {
        Ok(RowValues::Null)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<RowValues, E> {
        Ok(RowValues::Int(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<RowValues, E> {
        i64::try_from(value)
            .map(RowValues::Int)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &"a signed 64-bit integer"))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<RowValues, E> {
        Ok(RowValues::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<RowValues, E> {
        Ok(RowValues::Text(value.to_owned()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<RowValues, E> {
        Ok(RowValues::Text(value))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RowValues, A::Error> {
        let Some((tag, payload)) = map.next_entry::<String, String>()? else {
            return Err(de::Error::custom("empty object is not a value"));
        };
        if map.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("tagged value must have exactly one key"));
        }

        match tag.as_str() {
            BINARY_TAG => STANDARD
                .decode(payload.as_bytes())
                .map(RowValues::Blob)
                .map_err(|e| de::Error::custom(format!("invalid base64 in {BINARY_TAG}: {e}"))),
            FLOAT_TAG => match payload.as_str() {
                "NaN" => Ok(RowValues::Float(f64::NAN)),
                "inf" => Ok(RowValues::Float(f64::INFINITY)),
                "-inf" => Ok(RowValues::Float(f64::NEG_INFINITY)),
                other => Err(de::Error::custom(format!(
                    "unknown {FLOAT_TAG} value {other:?}"
                ))),
            },
            other => Err(de::Error::custom(format!("unknown value tag {other:?}"))),
        }
    }
}

/// One encoded row, kept as ordered pairs so column order survives decoding.
struct EncodedRow(Vec<(String, RowValues)>);

impl<'de> Deserialize<'de> for EncodedRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = EncodedRow;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a row object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<EncodedRow, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(pair) = map.next_entry::<String, RowValues>()? {
                    pairs.push(pair);
                }
                Ok(EncodedRow(pairs))
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

struct EncodedRows(Vec<EncodedRow>);

impl<'de> Deserialize<'de> for EncodedRows {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowsVisitor;

        impl<'de> Visitor<'de> for RowsVisitor {
            type Value = EncodedRows;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of row objects")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<EncodedRows, A::Error> {
                let mut rows = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(row) = seq.next_element::<EncodedRow>()? {
                    rows.push(row);
                }
                Ok(EncodedRows(rows))
            }
        }

        deserializer.deserialize_seq(RowsVisitor)
    }
}

impl ResultSet {
    /// Encode the rows in the canonical form.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::SerializationError` if encoding fails.
    pub fn to_canonical_json(&self) -> Result<String, SqlMiddlewareDbError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode rows previously produced by [`ResultSet::to_canonical_json`].
    ///
    /// Column names come from the first row; every row must list the same columns in
    /// the same order. An empty array decodes to a result set without columns.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::SerializationError` for malformed input or rows
    /// whose columns disagree.
    pub fn from_canonical_json(text: &str) -> Result<ResultSet, SqlMiddlewareDbError> {
        let EncodedRows(rows) = serde_json::from_str(text)?;

        let Some(first) = rows.first() else {
            return Ok(ResultSet::default());
        };
        let names: Vec<String> = first.0.iter().map(|(name, _)| name.clone()).collect();
        let mut result_set = ResultSet::with_capacity(names.clone(), rows.len());

        for (idx, EncodedRow(pairs)) in rows.into_iter().enumerate() {
            let same_columns = pairs.len() == names.len()
                && pairs.iter().zip(&names).all(|((name, _), expected)| name == expected);
            if !same_columns {
                return Err(SqlMiddlewareDbError::SerializationError(de::Error::custom(
                    format!("row {idx} does not match the columns of the first row"),
                )));
            }
            result_set.add_row_values(pairs.into_iter().map(|(_, value)| value).collect())?;
        }

        Ok(result_set)
    }
}
