//! `key=value` encoding into a [`Buffer`].
//!
//! Every helper here reserves room for the field separator, the `=` and the
//! line terminator that closes the message, so a message can always be
//! finished with a newline no matter how many fields were written before. A
//! field that does not fit is dropped whole; nothing is written.
//!
//! Values that contain a space, `=`, `"` or a newline are wrapped in double
//! quotes with `"` and newline escaped as `\"` and `\n`. A quoted value that
//! does not fit is cut short and ends in `..."`, which keeps the line
//! parseable.

use std::io::Write;

use base64::Engine;

use crate::{buffer::Buffer, error::Value};

/// Byte placed between fields.
pub(crate) const SEPARATOR: u8 = b' ';

/// Separator, `=` and the final newline.
const FIELD_OVERHEAD: usize = 3;

/// Smallest truncated quoted value: an opening quote plus `..."`.
const MIN_QUOTED: usize = 5;

const ELLIPSIS_QUOTE: &[u8] = b"...\"";

/// Longest rendering of an `i64` (`-9223372036854775808`).
const MAX_INT_LEN: usize = 20;

#[inline]
fn needs_quoting(byte: u8) -> bool {
    matches!(byte, b' ' | b'=' | b'"' | b'\n')
}

#[inline]
fn needs_escape(byte: u8) -> bool {
    matches!(byte, b'"' | b'\n')
}

/// Writes `key=` when `len` more bytes of value still leave room for the line
/// terminator. Returns whether the caller may write the value.
pub(crate) fn write_key_for_value_len(buffer: &mut Buffer, key: &str, len: usize) -> bool {
    if buffer.error().is_some() || buffer.available() < key.len() + len + FIELD_OVERHEAD {
        return false;
    }

    let sep = usize::from(!buffer.is_empty());
    let Ok(mut reservation) = buffer.reserve(sep + key.len() + 1) else {
        return false;
    };
    if sep == 1 {
        reservation.write_byte(SEPARATOR);
    }
    reservation.write_slice(key.as_bytes());
    reservation.write_byte(b'=');
    true
}

/// Writes a string field, quoting and truncating as needed.
pub(crate) fn write_key_value(buffer: &mut Buffer, key: &str, value: &str) {
    let bytes = value.as_bytes();
    if !bytes.iter().copied().any(needs_quoting) {
        if write_key_for_value_len(buffer, key, bytes.len()) {
            buffer.write_bytes(bytes).ok();
        }
        return;
    }

    if buffer.error().is_some() {
        return;
    }

    let sep = usize::from(!buffer.is_empty());
    let overhead = sep + key.len() + 2;
    let Some(room) = buffer.available().checked_sub(overhead) else {
        return;
    };
    if room < MIN_QUOTED {
        return;
    }

    let escapes = bytes.iter().copied().filter(|b| needs_escape(*b)).count();
    let full = bytes.len() + escapes + 2;
    let quoted = room.min(full + ELLIPSIS_QUOTE.len() - 1);

    let Ok(mut r) = buffer.reserve(sep + key.len() + 1 + quoted) else {
        return;
    };
    if sep == 1 {
        r.write_byte(SEPARATOR);
    }
    r.write_slice(key.as_bytes());
    r.write_byte(b'=');
    r.write_byte(b'"');

    // keep enough room after every character for a trailing `..."`
    let mut written = 1;
    let mut utf8 = [0u8; 4];
    for c in value.chars() {
        let width = c.len_utf8() + usize::from(c == '"' || c == '\n');
        if written + width + ELLIPSIS_QUOTE.len() > room {
            r.write_slice(ELLIPSIS_QUOTE);
            return;
        }
        match c {
            '"' => r.write_slice(b"\\\""),
            '\n' => r.write_slice(b"\\n"),
            c => r.write_slice(c.encode_utf8(&mut utf8).as_bytes()),
        }
        written += width;
    }
    r.write_byte(b'"');
}

/// Renders `value` in decimal into `out`, returning the used prefix.
pub(crate) fn format_int(value: i64, out: &mut [u8; MAX_INT_LEN]) -> &[u8] {
    let mut cursor = std::io::Cursor::new(&mut out[..]);
    write!(cursor, "{}", value).ok();
    let len = cursor.position() as usize;
    &out[..len]
}

pub(crate) fn write_key_int(buffer: &mut Buffer, key: &str, value: i64) {
    let mut scratch = [0u8; MAX_INT_LEN];
    let digits = format_int(value, &mut scratch);
    if write_key_for_value_len(buffer, key, digits.len()) {
        buffer.write_bytes(digits).ok();
    }
}

pub(crate) fn write_key_bool(buffer: &mut Buffer, key: &str, value: bool) {
    if write_key_for_value_len(buffer, key, 1) {
        buffer.write_byte(if value { b'Y' } else { b'N' }).ok();
    }
}

/// Writes `value` as unpadded URL-safe base64.
pub(crate) fn write_key_binary(buffer: &mut Buffer, key: &str, value: &[u8]) {
    let Some(len) = base64::encoded_len(value.len(), false) else {
        return;
    };
    if !write_key_for_value_len(buffer, key, len) {
        return;
    }
    if let Ok(mut r) = buffer.reserve(len) {
        r.write_with(|dst| {
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode_slice(value, dst)
                .unwrap_or(0)
        });
    }
}

/// Writes one typed value.
pub(crate) fn write_key_typed(buffer: &mut Buffer, key: &str, value: &Value) {
    match value {
        Value::Str(v) => write_key_value(buffer, key, v),
        Value::Int(v) => write_key_int(buffer, key, *v),
        Value::Bool(v) => write_key_bool(buffer, key, *v),
        Value::Binary(v) => write_key_binary(buffer, key, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(b: &Buffer) -> &str {
        std::str::from_utf8(b.ok_bytes()).unwrap()
    }

    #[test]
    fn test_raw_value() {
        let mut b = Buffer::new(16, 64);
        write_key_value(&mut b, "a", "hello");
        write_key_value(&mut b, "b", "world");
        assert_eq!(written(&b), "a=hello b=world");
    }

    #[test]
    fn test_quoted_value() {
        let mut b = Buffer::new(16, 64);
        write_key_value(&mut b, "a", "hello world");
        write_key_value(&mut b, "b", "x=1");
        write_key_value(&mut b, "c", "say \"hi\"\nbye");
        assert_eq!(
            written(&b),
            r#"a="hello world" b="x=1" c="say \"hi\"\nbye""#
        );
    }

    #[test]
    fn test_empty_value() {
        let mut b = Buffer::new(16, 64);
        write_key_value(&mut b, "a", "");
        assert_eq!(written(&b), "a=");
    }

    #[test]
    fn test_raw_value_dropped_when_too_long() {
        // a=1234 plus separator and newline needs the last 8 bytes
        let mut b = Buffer::containing(b"x".to_vec(), 9);
        write_key_value(&mut b, "a", "12345");
        assert_eq!(written(&b), "x");
        write_key_value(&mut b, "a", "1234");
        assert_eq!(written(&b), "x a=1234");
        assert!(b.error().is_none());
    }

    #[test]
    fn test_quoted_value_truncated() {
        // 14 bytes left: separator, key, '=' and newline leave 10 for "a"
        let prefix = vec![b'p'; 29];

        let mut b = Buffer::containing(prefix.clone(), 43);
        write_key_value(&mut b, "a", "1\"bc");
        assert_eq!(&written(&b)[29..], r#" a="1\"bc""#);

        let mut b = Buffer::containing(prefix.clone(), 43);
        write_key_value(&mut b, "a", "1\"bcd");
        assert_eq!(&written(&b)[29..], r#" a="1\"bc...""#);

        let mut b = Buffer::containing(prefix.clone(), 43);
        write_key_value(&mut b, "ab", "1\"b");
        assert_eq!(&written(&b)[29..], r#" ab="1\"b""#);

        let mut b = Buffer::containing(prefix, 43);
        write_key_value(&mut b, "ab", "1\"bc");
        assert_eq!(&written(&b)[29..], r#" ab="1\"b...""#);
        assert_eq!(b.available(), 1);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut b = Buffer::new(0, 14);
        write_key_value(&mut b, "k", "é é é é");
        let s = written(&b);
        assert!(s.starts_with("k=\"é"));
        assert!(s.ends_with("...\""));
        assert!(s.len() <= 13);
    }

    #[test]
    fn test_quoted_value_dropped_without_room() {
        let mut b = Buffer::new(0, 7);
        write_key_value(&mut b, "k", "a b c");
        assert!(b.is_empty());
        assert!(b.error().is_none());
    }

    #[test]
    fn test_sticky_error_blocks_fields() {
        let mut b = Buffer::new(4, 8);
        assert!(b.write_str("hello world").is_err());
        write_key_value(&mut b, "a", "1");
        write_key_int(&mut b, "b", 2);
        assert!(b.is_empty());
        assert!(!write_key_for_value_len(&mut b, "c", 1));
    }

    #[test]
    fn test_format_int() {
        let mut scratch = [0u8; MAX_INT_LEN];
        assert_eq!(format_int(0, &mut scratch), b"0");
        assert_eq!(format_int(-99, &mut scratch), b"-99");
        assert_eq!(format_int(i64::MIN, &mut scratch), b"-9223372036854775808");
        assert_eq!(format_int(i64::MAX, &mut scratch), b"9223372036854775807");
    }

    #[test]
    fn test_typed_values() {
        let mut b = Buffer::new(16, 128);
        write_key_typed(&mut b, "n", &Value::Int(-3));
        write_key_typed(&mut b, "ok", &Value::Bool(true));
        write_key_typed(&mut b, "no", &Value::Bool(false));
        write_key_typed(&mut b, "raw", &Value::Binary(vec![1, 2, 3]));
        write_key_typed(&mut b, "s", &Value::from("a b"));
        assert_eq!(written(&b), r#"n=-3 ok=Y no=N raw=AQID s="a b""#);
    }

    #[test]
    fn test_binary_is_url_safe() {
        let mut b = Buffer::new(16, 128);
        write_key_binary(&mut b, "k", &[0xfb, 0xff, 0xfe]);
        assert_eq!(written(&b), "k=-__-");
    }
}
