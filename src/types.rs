use clap::ValueEnum;
use serde::Deserialize;

/// Values that can be stored in a database row or rendered into a statement.
///
/// Every column a query returns is decoded into one of these, so helpers never
/// need to branch on driver types:
/// ```rust
/// use mysql_middleware::prelude::*;
///
/// let values = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Null,
/// ];
/// # let _ = values;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// NULL value
    Null,
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Short name of the value's type, used in log fields and error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "int",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Null => "null",
            RowValues::Blob(_) => "binary",
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Shortest round-trip text for a finite float, always with a decimal point
/// (`2.0`, `0.25`, `1.0e300`). Valid both as a SQL DOUBLE literal and as JSON.
pub(crate) fn float_literal(value: f64) -> String {
    let rendered = format!("{value:?}");
    match rendered.find(['e', 'E']) {
        _ if rendered.contains('.') => rendered,
        Some(exp) => format!("{}.0{}", &rendered[..exp], &rendered[exp..]),
        None => format!("{rendered}.0"),
    }
}

/// Connection character sets understood by the escaper.
///
/// The multi-byte sets matter for escaping: a trailing byte of a valid
/// multi-byte character may equal `\` or `'`, and must be copied as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// 4-byte UTF-8
    #[default]
    Utf8mb4,
    /// 3-byte UTF-8 (`utf8` on older servers)
    #[serde(alias = "utf8")]
    #[value(alias = "utf8")]
    Utf8mb3,
    Latin1,
    Ascii,
    Binary,
    Gbk,
    Big5,
    Sjis,
    Cp932,
    Gb18030,
}

impl Charset {
    /// Name the server expects in `SET NAMES` / the handshake.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Charset::Utf8mb4 => "utf8mb4",
            Charset::Utf8mb3 => "utf8mb3",
            Charset::Latin1 => "latin1",
            Charset::Ascii => "ascii",
            Charset::Binary => "binary",
            Charset::Gbk => "gbk",
            Charset::Big5 => "big5",
            Charset::Sjis => "sjis",
            Charset::Cp932 => "cp932",
            Charset::Gb18030 => "gb18030",
        }
    }

    /// Longest character in bytes.
    #[must_use]
    pub fn max_char_len(self) -> usize {
        match self {
            Charset::Utf8mb4 | Charset::Gb18030 => 4,
            Charset::Utf8mb3 => 3,
            Charset::Gbk | Charset::Big5 | Charset::Sjis | Charset::Cp932 => 2,
            Charset::Latin1 | Charset::Ascii | Charset::Binary => 1,
        }
    }

    #[must_use]
    pub fn is_multibyte(self) -> bool {
        self.max_char_len() > 1
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
