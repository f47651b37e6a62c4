//! Pre-rendered fields.
//!
//! Data that is known up front, or repeated on many lines (a status code, a
//! service name), can be encoded once into a [`Field`] and copied verbatim
//! into each message with [`Logger::field`](crate::Logger::field).

use std::sync::Arc;

use crate::{
    buffer::Buffer,
    error::{Value, Values},
    writer,
};

const FIELD_MIN_SIZE: usize = 1024;
const FIELD_MAX_SIZE: usize = 4096;

/// Immutable, already encoded `key=value ...` block.
///
/// Cloning is cheap; the bytes are shared.
///
/// # Example
///
/// ```rust
/// use kvpool::Field;
///
/// let field = Field::builder().int("status", 404).string("svc", "auth api").finalize();
/// assert_eq!(field.kv(), br#"status=404 svc="auth api""#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    kv: Arc<[u8]>,
}

impl Field {
    pub fn builder() -> FieldBuilder {
        FieldBuilder::default()
    }

    /// The encoded bytes, without leading separator or trailing newline.
    pub fn kv(&self) -> &[u8] {
        &self.kv
    }

    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }
}

/// Collects typed values for a [`Field`]. Setting a key twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct FieldBuilder {
    values: Values,
}

impl FieldBuilder {
    pub fn string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.put(key, Value::Str(value.into()));
        self
    }

    pub fn int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.values.put(key, Value::Int(value));
        self
    }

    pub fn bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.values.put(key, Value::Bool(value));
        self
    }

    pub fn binary(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.values.put(key, Value::Binary(value.into()));
        self
    }

    /// Encodes the collected values, in insertion order.
    ///
    /// Values that do not fit in the scratch buffer are dropped the same way
    /// an oversized field is dropped from a log line.
    pub fn finalize(self) -> Field {
        let mut buffer = Buffer::new(FIELD_MIN_SIZE, FIELD_MAX_SIZE);
        for (key, value) in self.values.iter() {
            writer::write_key_typed(&mut buffer, key, value);
        }
        Field {
            kv: Arc::from(buffer.ok_bytes()),
        }
    }
}
