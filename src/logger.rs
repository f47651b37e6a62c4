//! Structured key=value log encoder.
//!
//! A [`Logger`] builds one line at a time into its own [`Buffer`] and writes
//! the finished line to a sink in a single call. Nothing is formatted through
//! `std::fmt` on the hot path: levels and keys are copied as bytes, integers
//! are rendered into a stack buffer and values are escaped straight into the
//! line.
//!
//! # Log Format
//!
//! ```text
//! _l=info _t=1700000000 _c=ctx1 a="hello world" n=3
//! ├─ level tag          ├─ context           └─ fields
//! └─ unix seconds after _t=
//! ```
//!
//! Level tags are `_l=info`, `_l=warn`, `_l=error`, `_l=fatal` and `_l=req`.
//!
//! # Fixed and multi-use data
//!
//! A logger can carry data in front of every message. [`Logger::fixed`] marks
//! everything written so far as permanent: it survives every reset and every
//! trip through the pool. [`Logger::multi_use`] marks data that should be
//! repeated on every message logged during the current checkout (a request id
//! for example); it is dropped on release or on [`Logger::reset`].
//!
//! # Failure
//!
//! Logging never fails. A field that does not fit in what is left of the
//! buffer is dropped. If the buffer itself hits its maximum (only the message
//! preamble is written unchecked) the buffer error wins: the remaining field
//! writes are skipped and the line is emitted with whatever was written
//! before the failure.

use std::{error::Error, fmt, io, str::FromStr, sync::Arc};

use crate::{
    appender::Appender,
    buffer::Buffer,
    error::StructuredError,
    field::Field,
    pool::Releaser,
    writer::{self, SEPARATOR},
};

/// Largest amount of memory a logger allocates up front.
const MAX_PREALLOCATED: usize = 4096;

/// Severity of a message, and the threshold below which messages are dropped.
///
/// [`Level::None`] is only meaningful as a threshold: it disables all output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Info,
    #[default]
    Warn,
    Error,
    Fatal,
    None,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::None => "NONE",
        }
    }

    /// Preamble written ahead of the timestamp.
    const fn tag(&self) -> &'static [u8] {
        match self {
            Level::Info => b"_l=info _t=",
            Level::Warn => b"_l=warn _t=",
            Level::Error => b"_l=error _t=",
            Level::Fatal | Level::None => b"_l=fatal _t=",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "FATAL" => Ok(Level::Fatal),
            "NONE" => Ok(Level::None),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

const REQUEST_TAG: &[u8] = b"_l=req _t=";

/// The state behind a [`Logger`] handle. This is what pools store.
pub(crate) struct KvLogger {
    buffer: Buffer,

    /// Lowest severity written.
    level: Level,

    /// Whether request lines are written at all.
    requests: bool,

    /// End of the data that survives every reset.
    fixed_len: usize,

    /// End of the data repeated on every message of this checkout.
    multi_use_len: Option<usize>,

    appender: Arc<Appender>,

    releaser: Option<Releaser<KvLogger>>,
}

impl KvLogger {
    pub(crate) fn new(
        max_size: usize,
        level: Level,
        requests: bool,
        appender: Arc<Appender>,
        releaser: Option<Releaser<KvLogger>>,
    ) -> Self {
        Self {
            buffer: Buffer::new(max_size.min(MAX_PREALLOCATED), max_size),
            level,
            requests,
            fixed_len: 0,
            multi_use_len: None,
            appender,
            releaser,
        }
    }

    /// Marks everything written so far as permanent.
    pub(crate) fn fixed(&mut self) {
        self.fixed_len = self.buffer.len();
    }

    pub(crate) fn write_field(&mut self, field: &Field) {
        let kv = field.kv();
        if kv.is_empty()
            || self.buffer.error().is_some()
            || self.buffer.available() < kv.len() + 2
        {
            return;
        }
        if !self.buffer.is_empty() {
            self.buffer.write_byte(SEPARATOR).ok();
        }
        self.buffer.write_bytes(kv).ok();
    }

    /// Writes the preamble of a new message.
    fn start(&mut self, ctx: &str, tag: &[u8]) {
        let buffer = &mut self.buffer;
        // non-empty when there is fixed or multi-use data
        if !buffer.is_empty() {
            buffer.write_byte(SEPARATOR).ok();
        }

        let mut scratch = [0u8; 20];
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        buffer.write_bytes(tag).ok();
        buffer.write_bytes(writer::format_int(now, &mut scratch)).ok();
        buffer.write_bytes(b" _c=").ok();
        buffer.write_str(ctx).ok();
    }

    /// Drops the current message and any multi-use data.
    fn clear(&mut self) {
        self.buffer.reset_to(self.fixed_len);
        self.multi_use_len = None;
    }
}

/// Handle to a logger checked out of a [`LoggerPool`](crate::LoggerPool), or
/// a standalone one.
///
/// All methods are chainable and none of them fail. A handle returned for a
/// message below the configured level is inert: every call on it is a no-op.
///
/// Dropping a handle hands the logger back to its pool, so a checkout can
/// never leak. Calling [`Logger::log`] does the same unless multi-use data is
/// set, in which case the handle stays usable for the next message.
///
/// # Example
///
/// ```rust
/// use kvpool::{Level, Logger};
///
/// let mut logger = Logger::new(256, Level::Info, true);
/// let mut out = Vec::new();
/// logger.info("startup").string("addr", "0.0.0.0:80").int("workers", 4).log_to(&mut out);
///
/// let line = String::from_utf8(out).unwrap();
/// assert!(line.starts_with("_l=info _t="));
/// assert!(line.ends_with(" _c=startup addr=0.0.0.0:80 workers=4\n"));
/// ```
pub struct Logger {
    inner: Option<KvLogger>,

    /// Set when a below-threshold message was started on a multi-use logger.
    suppressed: bool,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("active", &self.inner.is_some())
            .field("suppressed", &self.suppressed)
            .field("bytes", &String::from_utf8_lossy(self.bytes()))
            .finish()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.release();
    }
}

impl Logger {
    /// Creates a standalone logger writing to stdout.
    ///
    /// `max_size` bounds every line, terminator included.
    pub fn new(max_size: usize, level: Level, requests: bool) -> Self {
        Self::with_appender(max_size, level, requests, Arc::new(Appender::stdout()))
    }

    /// Creates a standalone logger writing to `appender`.
    pub fn with_appender(
        max_size: usize,
        level: Level,
        requests: bool,
        appender: Arc<Appender>,
    ) -> Self {
        Self::from_kv(KvLogger::new(max_size, level, requests, appender, None))
    }

    /// A handle that ignores every call.
    pub fn noop() -> Self {
        Self {
            inner: None,
            suppressed: false,
        }
    }

    pub(crate) fn from_kv(kv: KvLogger) -> Self {
        Self {
            inner: Some(kv),
            suppressed: false,
        }
    }

    /// Whether calls on this handle have any effect.
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    #[inline]
    fn active(&mut self) -> Option<&mut KvLogger> {
        if self.suppressed {
            return None;
        }
        self.inner.as_mut()
    }

    /// Starts a message, or suppresses it when `enabled` says no.
    ///
    /// A suppressed message on a pooled logger without multi-use data sends
    /// the logger back to the pool right away. Otherwise the logger is kept
    /// and ignores calls until the next [`Logger::log_to`].
    fn begin(&mut self, enabled: impl FnOnce(&KvLogger) -> bool, ctx: &str, tag: &[u8]) -> &mut Self {
        let Some(kv) = self.inner.as_mut() else {
            return self;
        };
        if enabled(kv) {
            self.suppressed = false;
            kv.start(ctx, tag);
            return self;
        }

        if kv.multi_use_len.is_none() {
            self.release();
        }
        self.suppressed = self.inner.is_some();
        self
    }

    /// Starts an info message with context `ctx`.
    pub fn info(&mut self, ctx: &str) -> &mut Self {
        self.begin(|kv| kv.level <= Level::Info, ctx, Level::Info.tag())
    }

    pub fn warn(&mut self, ctx: &str) -> &mut Self {
        self.begin(|kv| kv.level <= Level::Warn, ctx, Level::Warn.tag())
    }

    pub fn error(&mut self, ctx: &str) -> &mut Self {
        self.begin(|kv| kv.level <= Level::Error, ctx, Level::Error.tag())
    }

    pub fn fatal(&mut self, ctx: &str) -> &mut Self {
        self.begin(|kv| kv.level <= Level::Fatal, ctx, Level::Fatal.tag())
    }

    /// Starts a request line for `route`. Gated by the request flag, not the level.
    pub fn request(&mut self, route: &str) -> &mut Self {
        self.begin(|kv| kv.requests, route, REQUEST_TAG)
    }

    /// Adds `key=value`, quoting the value when it contains a space, `=`, `"`
    /// or a newline. A quoted value that does not fit is cut short with `...`.
    pub fn string(&mut self, key: &str, value: &str) -> &mut Self {
        if let Some(kv) = self.active() {
            writer::write_key_value(&mut kv.buffer, key, value);
        }
        self
    }

    pub fn int(&mut self, key: &str, value: i64) -> &mut Self {
        if let Some(kv) = self.active() {
            writer::write_key_int(&mut kv.buffer, key, value);
        }
        self
    }

    /// Adds `key=Y` or `key=N`.
    pub fn bool(&mut self, key: &str, value: bool) -> &mut Self {
        if let Some(kv) = self.active() {
            writer::write_key_bool(&mut kv.buffer, key, value);
        }
        self
    }

    /// Adds `value` as unpadded URL-safe base64.
    pub fn binary(&mut self, key: &str, value: &[u8]) -> &mut Self {
        if let Some(kv) = self.active() {
            writer::write_key_binary(&mut kv.buffer, key, value);
        }
        self
    }

    /// Adds an error.
    ///
    /// A [`StructuredError`] is unpacked into `_code=`, `_err=` (the wrapped
    /// error) and one field per data entry. Any other error becomes `_err=`.
    pub fn err(&mut self, err: &(dyn Error + 'static)) -> &mut Self {
        let Some(kv) = self.active() else {
            return self;
        };
        let buffer = &mut kv.buffer;
        match err.downcast_ref::<StructuredError>() {
            Some(se) => {
                writer::write_key_int(buffer, "_code", i64::from(se.code()));
                writer::write_key_value(buffer, "_err", &se.inner().to_string());
                for (key, value) in se.data() {
                    writer::write_key_typed(buffer, key, value);
                }
            }
            None => writer::write_key_value(buffer, "_err", &err.to_string()),
        }
        self
    }

    /// Copies a pre-rendered [`Field`] into the message. Dropped whole if it
    /// does not fit.
    pub fn field(&mut self, field: &Field) -> &mut Self {
        if let Some(kv) = self.active() {
            kv.write_field(field);
        }
        self
    }

    /// Makes everything written so far part of every future message.
    pub fn fixed(&mut self) -> &mut Self {
        if let Some(kv) = self.active() {
            kv.fixed();
        }
        self
    }

    /// Repeats everything written so far on each message until the logger is
    /// released or [`Logger::reset`].
    pub fn multi_use(&mut self) -> &mut Self {
        if let Some(kv) = self.active() {
            kv.multi_use_len = Some(kv.buffer.len());
        }
        self
    }

    /// The message so far. Empty for an inert handle.
    pub fn bytes(&self) -> &[u8] {
        match &self.inner {
            Some(kv) => kv.buffer.ok_bytes(),
            None => &[],
        }
    }

    /// Terminates the line and writes it to the logger's sink.
    pub fn log(&mut self) {
        let Some(appender) = self.inner.as_ref().map(|kv| kv.appender.clone()) else {
            return;
        };
        let mut out = appender.lock();
        self.log_to(&mut **out);
    }

    /// Terminates the line and writes it to `out`.
    ///
    /// The whole buffer is written, fixed and multi-use data included. Write
    /// errors are ignored.
    pub fn log_to<W: io::Write + ?Sized>(&mut self, out: &mut W) {
        if self.suppressed {
            self.suppressed = false;
            return;
        }
        let Some(kv) = self.inner.as_mut() else {
            return;
        };

        let terminated = kv.buffer.write_byte(b'\n').is_ok();
        out.write_all(kv.buffer.ok_bytes()).ok();
        if !terminated {
            out.write_all(b"\n").ok();
        }

        let multi_use_len = kv.multi_use_len;
        match multi_use_len {
            Some(len) => kv.buffer.reset_to(len),
            None => self.release(),
        }
    }

    /// Drops the current message and any multi-use data, keeping fixed data.
    ///
    /// The logger stays checked out until the next [`Logger::log`]. With the
    /// multi-use data gone, that log releases a pooled logger like any other
    /// single message and leaves this handle inert. Mark new data with
    /// [`Logger::multi_use`] after the reset to keep logging through it.
    pub fn reset(&mut self) {
        self.suppressed = false;
        if let Some(kv) = self.inner.as_mut() {
            kv.clear();
        }
    }

    /// Hands the logger back to its pool, leaving this handle inert.
    ///
    /// A standalone logger has no pool; it is only reset and stays usable.
    pub fn release(&mut self) {
        self.suppressed = false;
        let Some(mut kv) = self.inner.take() else {
            return;
        };
        kv.clear();
        match kv.releaser.clone() {
            Some(releaser) => {
                // pool is gone; the logger is simply dropped
                let _ = releaser.release(kv);
            }
            None => self.inner = Some(kv),
        }
    }
}
