//! Errors designed to be logged as structured fields.
//!
//! A [`StructuredError`] carries a numeric code and a small bag of typed values
//! next to the underlying error. When handed to [`Logger::err`] it is unpacked
//! into `_code=`, `_err=` and one field per data entry instead of being
//! rendered as a single opaque string.
//!
//! [`Logger::err`]: crate::Logger::err

use std::{error::Error, fmt};

/// Boxed error accepted as the source of a [`StructuredError`].
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Key under which a wrapped structured error's code is recorded.
pub const INNER_CODE_KEY: &str = "_icode";

/// Typed value attached to a [`StructuredError`] or a [`Field`](crate::Field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    Binary(Vec<u8>),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

/// Insertion-ordered key/value bag where writing an existing key replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Values(Vec<(String, Value)>);

impl Values {
    pub(crate) fn put(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    /// Adds the entry unless `key` is already present.
    pub(crate) fn put_missing(&mut self, key: &str, value: &Value) {
        if self.get(key).is_none() {
            self.0.push((key.to_owned(), value.clone()));
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An error with a machine-readable code and attached data.
///
/// Wrapping another `StructuredError` merges the inner data into the outer
/// one (outer keys win) and records the inner code under `_icode`, so several
/// layers of wrapping stay distinguishable in the logs.
///
/// # Example
///
/// ```rust
/// use kvpool::StructuredError;
///
/// let inner = StructuredError::new(311, "disk full").string("path", "/tmp");
/// let outer = StructuredError::new(312, inner).int("attempt", 2);
///
/// assert_eq!(outer.to_string(), "code: 312 - code: 311 - disk full");
/// assert_eq!(outer.get("_icode"), Some(&311i64.into()));
/// assert_eq!(outer.get("path"), Some(&"/tmp".into()));
/// ```
#[derive(Debug)]
pub struct StructuredError {
    code: i32,
    err: BoxError,
    data: Values,
}

impl StructuredError {
    /// Wraps `err` under `code`.
    pub fn new(code: i32, err: impl Into<BoxError>) -> Self {
        Self::with_data(code, err, std::iter::empty::<(String, Value)>())
    }

    /// Wraps `err` under `code` with initial data.
    pub fn with_data<I, K>(code: i32, err: impl Into<BoxError>, data: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let err = err.into();
        let mut values = Values::default();
        for (key, value) in data {
            values.put(key, value);
        }

        if let Some(nested) = err.downcast_ref::<StructuredError>() {
            for (key, value) in nested.data.iter() {
                values.put_missing(key, value);
            }
            values.put(INNER_CODE_KEY, Value::Int(i64::from(nested.code)));
        }

        Self {
            code,
            err,
            data: values,
        }
    }

    /// Builds an error from a displayable message.
    pub fn msg(code: i32, message: impl fmt::Display) -> Self {
        Self::new(code, message.to_string())
    }

    pub fn string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.put(key, Value::Str(value.into()));
        self
    }

    pub fn int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.data.put(key, Value::Int(value));
        self
    }

    pub fn bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.data.put(key, Value::Bool(value));
        self
    }

    pub fn binary(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.put(key, Value::Binary(value.into()));
        self
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    /// The wrapped error.
    pub fn inner(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.err
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Attached data, in insertion order.
    pub fn data(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter()
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {} - {}", self.code, self.err)
    }
}

impl Error for StructuredError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StructuredError::new(299, "test_error");
        assert_eq!(err.to_string(), "code: 299 - test_error");
        assert_eq!(err.code(), 299);
        assert!(!err.has_data());
        assert_eq!(err.inner().to_string(), "test_error");
    }

    #[test]
    fn test_msg() {
        let err = StructuredError::msg(3001, format_args!("bad {}", "level"));
        assert_eq!(err.to_string(), "code: 3001 - bad level");
    }

    #[test]
    fn test_data_upserts() {
        let err = StructuredError::new(311, "test_error2")
            .string("a", "z")
            .int("zero", 0)
            .int("zero", 1)
            .bool("ok", true)
            .binary("raw", vec![1, 2, 3]);

        let data: Vec<_> = err.data().map(|(k, _)| k).collect();
        assert_eq!(data, ["a", "zero", "ok", "raw"]);
        assert_eq!(err.get("zero"), Some(&Value::Int(1)));
        assert_eq!(err.get("raw"), Some(&Value::Binary(vec![1, 2, 3])));
    }

    #[test]
    fn test_nesting_no_data() {
        let s1 = StructuredError::new(311, "test_error2");
        let s2 = StructuredError::new(312, s1);

        assert_eq!(s2.to_string(), "code: 312 - code: 311 - test_error2");
        assert_eq!(s2.get(INNER_CODE_KEY), Some(&Value::Int(311)));
        assert_eq!(s2.data().count(), 1);
    }

    #[test]
    fn test_nesting_merges_data() {
        let s1 = StructuredError::new(311, "test_error2")
            .string("id", "a")
            .int("x", 9);
        let s2 = StructuredError::new(312, s1).string("other", "b").int("x", 8);

        assert_eq!(s2.get("id"), Some(&Value::from("a")));
        assert_eq!(s2.get("other"), Some(&Value::from("b")));
        assert_eq!(s2.get("x"), Some(&Value::Int(8)));
        assert_eq!(s2.get(INNER_CODE_KEY), Some(&Value::Int(311)));

        let s1 = StructuredError::new(311, "test_error2")
            .string("id", "a")
            .int("x", 9);
        let s3 = StructuredError::with_data(
            312,
            s1,
            [("other", Value::from("b2")), ("x", Value::Int(10))],
        );
        assert_eq!(s3.get("id"), Some(&Value::from("a")));
        assert_eq!(s3.get("other"), Some(&Value::from("b2")));
        assert_eq!(s3.get("x"), Some(&Value::Int(10)));
        assert_eq!(s3.get(INNER_CODE_KEY), Some(&Value::Int(311)));
    }

    #[test]
    fn test_source() {
        let err = StructuredError::new(1, std::io::Error::other("boom"));
        assert_eq!(err.source().map(|e| e.to_string()), Some("boom".to_owned()));
    }
}
