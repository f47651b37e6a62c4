//! Sharded object pools, bounded growable buffers and a pooled `key=value`
//! log encoder.
//!
//! # Overview
//!
//! ```text
//! [Caller] → [LoggerPool] → level check → [Logger] → fields → [Buffer]
//!                 ↓                          ↓
//!             noop handle               log() → [Appender] → Output
//! ```
//!
//! * [`pool::Pool`] spreads warm items over a few lock-free queues and falls
//!   back to creating new ones instead of blocking.
//! * [`Buffer`] pre-allocates its minimum size, grows up to a hard maximum and
//!   reports overflow through a sticky error.
//! * [`Logger`] writes one `key=value` line into its buffer and hands it to a
//!   shared [`Appender`].
//!
//! # Global logger
//!
//! Services usually install one process-wide pool at startup:
//!
//! ```rust,no_run
//! use kvpool::{LogBuilder, LogConfig};
//!
//! let _guard = LogBuilder::new()
//!     .with_config(LogConfig { level: "info".into(), ..LogConfig::default() })
//!     .build()
//!     .expect("invalid log configuration");
//!
//! kvpool::info("startup").int("port", 8080).log();
//! ```
//!
//! Dropping the guard uninstalls the pool and flushes its writer. Until a
//! pool is installed the global helpers return inert loggers.

use std::{io, sync::Arc};

use arc_swap::ArcSwapOption;

mod appender;
mod buffer;
mod buffer_pool;
pub mod codes;
mod config;
mod error;
mod field;
mod logger;
mod logger_pool;
pub mod pool;
mod writer;

#[cfg(test)]
mod testing;

pub use appender::Appender;
pub use buffer::{Buffer, BufferError, Reservation};
pub use buffer_pool::BufferPool;
pub use config::{BufferPoolConfig, ConfigError, Format, KvConfig, LogConfig};
pub use error::{BoxError, StructuredError, Value, INNER_CODE_KEY};
pub use field::{Field, FieldBuilder};
pub use logger::{Level, Logger, ParseLevelError};
pub use logger_pool::LoggerPool;

static GLOBAL: ArcSwapOption<LoggerPool> = ArcSwapOption::const_empty();

static FACADE: Facade = Facade;

/// The installed pool, if any.
pub fn global() -> Option<Arc<LoggerPool>> {
    GLOBAL.load_full()
}

/// Takes a logger from the global pool without a level check.
pub fn checkout() -> Logger {
    match &*GLOBAL.load() {
        Some(pool) => pool.checkout(),
        None => Logger::noop(),
    }
}

/// Starts an info message on the global pool.
pub fn info(ctx: &str) -> Logger {
    match &*GLOBAL.load() {
        Some(pool) => pool.info(ctx),
        None => Logger::noop(),
    }
}

pub fn warn(ctx: &str) -> Logger {
    match &*GLOBAL.load() {
        Some(pool) => pool.warn(ctx),
        None => Logger::noop(),
    }
}

pub fn error(ctx: &str) -> Logger {
    match &*GLOBAL.load() {
        Some(pool) => pool.error(ctx),
        None => Logger::noop(),
    }
}

pub fn fatal(ctx: &str) -> Logger {
    match &*GLOBAL.load() {
        Some(pool) => pool.fatal(ctx),
        None => Logger::noop(),
    }
}

/// Starts a request line on the global pool.
pub fn request(route: &str) -> Logger {
    match &*GLOBAL.load() {
        Some(pool) => pool.request(route),
        None => Logger::noop(),
    }
}

/// Installs a global pool writing to stdout.
///
/// Shortcut for `LogBuilder::new().with_config(config).build()`.
pub fn configure(config: LogConfig) -> Result<LogGuard, ConfigError> {
    LogBuilder::new().with_config(config).build()
}

/// Keeps the global pool installed. Dropping it uninstalls the pool (unless
/// another one has replaced it since) and flushes the writer.
#[must_use = "dropping the guard uninstalls the logger"]
pub struct LogGuard {
    pool: Arc<LoggerPool>,
}

impl LogGuard {
    pub fn pool(&self) -> &LoggerPool {
        &self.pool
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        GLOBAL.rcu(|current| match current {
            Some(pool) if Arc::ptr_eq(pool, &self.pool) => None,
            other => other.clone(),
        });
        self.pool.flush().ok();
    }
}

/// Builder for the global logger.
///
/// # Example
///
/// ```rust,no_run
/// use std::io::{self, BufWriter};
/// use kvpool::{Field, LogBuilder, LogConfig};
///
/// let _guard = LogBuilder::new()
///     .with_config(LogConfig::default())
///     .with_writer(BufWriter::new(io::stderr()))
///     .with_field(Field::builder().string("svc", "billing").finalize())
///     .with_log_facade()
///     .build()
///     .expect("failed to configure logging");
///
/// log::warn!("facade records land in the pool too");
/// ```
#[derive(Default)]
pub struct LogBuilder {
    config: LogConfig,
    wr: Option<Box<dyn io::Write + Send>>,
    field: Option<Field>,
    facade: bool,
}

impl LogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Writes lines to `wr` instead of stdout.
    pub fn with_writer<W: io::Write + Send + 'static>(mut self, wr: W) -> Self {
        self.wr = Some(Box::new(wr));
        self
    }

    /// Writes `field` into every logger of the pool, as fixed data.
    pub fn with_field(mut self, field: Field) -> Self {
        self.field = Some(field);
        self
    }

    /// Also routes `log::error!`, `log::warn!` and `log::info!` records to
    /// the pool. Fails the build if another `log` backend is already set.
    pub fn with_log_facade(mut self) -> Self {
        self.facade = true;
        self
    }

    /// Validates the configuration, installs the pool and logs the
    /// effective settings as a `log_config` info line.
    pub fn build(self) -> Result<LogGuard, ConfigError> {
        let level = self.config.level()?;
        let format = self.config.format()?;
        let appender = Arc::new(match self.wr {
            Some(wr) => Appender::new(wr),
            None => Appender::stdout(),
        });
        let pool = Arc::new(LoggerPool::from_config(&self.config, self.field, appender)?);

        if self.facade {
            log::set_logger(&FACADE)?;
            log::set_max_level(log::LevelFilter::Info);
        }

        GLOBAL.store(Some(pool.clone()));
        pool.info("log_config")
            .string("level", level.as_str())
            .string("format", format.as_str())
            .int("pool_size", i64::from(self.config.pool_size()))
            .bool("requests", self.config.requests())
            .log();

        Ok(LogGuard { pool })
    }
}

/// `log` backend forwarding records to the global pool.
///
/// The record target becomes the context and the formatted message a `msg`
/// field. Debug and trace records have no matching severity and are dropped.
struct Facade;

impl Facade {
    fn level(level: log::Level) -> Option<Level> {
        match level {
            log::Level::Error => Some(Level::Error),
            log::Level::Warn => Some(Level::Warn),
            log::Level::Info => Some(Level::Info),
            log::Level::Debug | log::Level::Trace => None,
        }
    }
}

impl log::Log for Facade {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        let Some(level) = Self::level(metadata.level()) else {
            return false;
        };
        match &*GLOBAL.load() {
            Some(pool) => pool.enabled(level),
            None => false,
        }
    }

    fn log(&self, record: &log::Record) {
        let mut logger = match Self::level(record.level()) {
            Some(Level::Error) => error(record.target()),
            Some(Level::Warn) => warn(record.target()),
            Some(Level::Info) => info(record.target()),
            _ => return,
        };
        if logger.is_noop() {
            return;
        }
        match record.args().as_str() {
            Some(msg) => logger.string("msg", msg),
            None => logger.string("msg", &record.args().to_string()),
        };
        logger.log();
    }

    fn flush(&self) {
        if let Some(pool) = &*GLOBAL.load() {
            pool.flush().ok();
        }
    }
}
