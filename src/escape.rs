//! Charset-aware escaping of string literal contents.
//!
//! The output is meant to be placed between single quotes. Identifiers are not
//! handled here; see [`crate::query_builder`].

use crate::error::SqlMiddlewareDbError;
use crate::types::Charset;

/// Escape raw bytes for use inside a quoted SQL literal on a connection using `charset`.
///
/// Valid multi-byte characters are copied untouched, so a trailing byte equal to
/// `\` or `'` is never split off. A byte that opens a multi-byte character but is
/// not followed by a valid one is itself escaped, which keeps it from fusing with
/// an inserted backslash into a new character.
#[must_use]
pub fn escape_bytes(raw: &[u8], charset: Charset) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 8 + 2);
    let mut idx = 0;
    while idx < raw.len() {
        if charset.is_multibyte() {
            if let Some(len) = multibyte_len(charset, &raw[idx..]) {
                out.extend_from_slice(&raw[idx..idx + len]);
                idx += len;
                continue;
            }
            if is_lead_byte(charset, raw[idx]) {
                out.push(b'\\');
                out.push(raw[idx]);
                idx += 1;
                continue;
            }
        }

        let byte = raw[idx];
        match escape_for(byte) {
            Some(replacement) => {
                out.push(b'\\');
                out.push(replacement);
            }
            None => out.push(byte),
        }
        idx += 1;
    }
    out
}

/// Escape UTF-8 text for a quoted literal on a connection using `charset`.
///
/// # Errors
/// Returns `SqlMiddlewareDbError::ParameterError` when the text cannot be escaped
/// without producing bytes that are not valid UTF-8. This only happens with the
/// legacy double-byte charsets (`gbk`, `big5`, `sjis`, ...), where such text must be
/// transcoded by the caller and passed through [`escape_bytes`].
pub fn escape_string(raw: &str, charset: Charset) -> Result<String, SqlMiddlewareDbError> {
    String::from_utf8(escape_bytes(raw.as_bytes(), charset)).map_err(|_| {
        SqlMiddlewareDbError::ParameterError(format!(
            "text cannot be escaped safely for charset {charset}; transcode it and use escape_bytes"
        ))
    })
}

fn escape_for(byte: u8) -> Option<u8> {
    match byte {
        0 => Some(b'0'),
        b'\n' => Some(b'n'),
        b'\r' => Some(b'r'),
        b'\\' => Some(b'\\'),
        b'\'' => Some(b'\''),
        b'"' => Some(b'"'),
        0x1a => Some(b'Z'),
        _ => None,
    }
}

fn is_lead_byte(charset: Charset, byte: u8) -> bool {
    match charset {
        Charset::Utf8mb4 => (0xC2..=0xF4).contains(&byte),
        Charset::Utf8mb3 => (0xC2..=0xEF).contains(&byte),
        Charset::Gbk | Charset::Gb18030 => (0x81..=0xFE).contains(&byte),
        Charset::Big5 => (0xA1..=0xF9).contains(&byte),
        Charset::Sjis | Charset::Cp932 => {
            (0x81..=0x9F).contains(&byte) || (0xE0..=0xFC).contains(&byte)
        }
        Charset::Latin1 | Charset::Ascii | Charset::Binary => false,
    }
}

/// Length of the valid multi-byte character starting at `bytes[0]`, if there is one.
fn multibyte_len(charset: Charset, bytes: &[u8]) -> Option<usize> {
    let lead = *bytes.first()?;
    if !is_lead_byte(charset, lead) {
        return None;
    }
    let trail = |idx: usize, ok: fn(u8) -> bool| bytes.get(idx).copied().is_some_and(ok);

    match charset {
        Charset::Utf8mb4 | Charset::Utf8mb3 => {
            let len = match lead {
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                _ => 4,
            };
            (1..len)
                .all(|idx| trail(idx, is_utf8_continuation))
                .then_some(len)
        }
        Charset::Gbk => trail(1, is_gbk_trail).then_some(2),
        Charset::Gb18030 => {
            if trail(1, is_gbk_trail) {
                Some(2)
            } else if trail(1, is_ascii_digit)
                && trail(2, |b| (0x81..=0xFE).contains(&b))
                && trail(3, is_ascii_digit)
            {
                Some(4)
            } else {
                None
            }
        }
        Charset::Big5 => trail(1, is_big5_trail).then_some(2),
        Charset::Sjis | Charset::Cp932 => trail(1, is_sjis_trail).then_some(2),
        Charset::Latin1 | Charset::Ascii | Charset::Binary => None,
    }
}

fn is_utf8_continuation(byte: u8) -> bool {
    (0x80..=0xBF).contains(&byte)
}

fn is_ascii_digit(byte: u8) -> bool {
    byte.is_ascii_digit()
}

fn is_gbk_trail(byte: u8) -> bool {
    (0x40..=0x7E).contains(&byte) || (0x80..=0xFE).contains(&byte)
}

fn is_big5_trail(byte: u8) -> bool {
    (0x40..=0x7E).contains(&byte) || (0xA1..=0xFE).contains(&byte)
}

fn is_sjis_trail(byte: u8) -> bool {
    (0x40..=0x7E).contains(&byte) || (0x80..=0xFC).contains(&byte)
}
