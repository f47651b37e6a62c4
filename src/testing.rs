//! Helpers shared by the unit tests.

use std::{collections::HashMap, io, sync::Arc};

use parking_lot::Mutex;

/// Cloneable in-memory writer.
#[derive(Debug, Clone, Default)]
pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Returns everything written so far and clears it.
    pub(crate) fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Splits one kv line into its fields. Quoted values are kept as written,
/// quotes and escapes included. Returns `None` for empty input.
pub(crate) fn kv_parse(line: &str) -> Option<HashMap<String, String>> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    let bytes = line.as_bytes();
    let mut fields = HashMap::new();
    let mut i = 0;
    while i < bytes.len() {
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' {
            i += 1;
        }
        let key = &line[key_start..i];
        i += 1;

        let value_start = i;
        if i < bytes.len() && bytes[i] == b'"' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
        } else {
            while i < bytes.len() && bytes[i] != b' ' {
                i += 1;
            }
        }
        let value_end = i.min(bytes.len());
        let value = line.get(value_start..value_end).unwrap_or_default();
        fields.insert(key.to_owned(), value.to_owned());
        // separator
        i += 1;
    }
    Some(fields)
}

/// Decodes a quoted value back to the original string.
pub(crate) fn unescape(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_owned();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_parse() {
        let fields = kv_parse("_l=info _t=1 _c=x a=\"b \\\"c\\\"\" d=1\n").unwrap();
        assert_eq!(fields["_l"], "info");
        assert_eq!(fields["a"], r#""b \"c\"""#);
        assert_eq!(unescape(&fields["a"]), r#"b "c""#);
        assert_eq!(fields["d"], "1");
        assert_eq!(fields.len(), 5);
        assert!(kv_parse("").is_none());
    }
}
