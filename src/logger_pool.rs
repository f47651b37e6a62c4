//! Pool of loggers with level gating.

use std::{io, sync::Arc};

use crate::{
    appender::Appender,
    config::{ConfigError, LogConfig},
    field::Field,
    logger::{KvLogger, Level, Logger},
    pool::Pool,
};

/// Sharded pool of [`Logger`]s sharing one level, request flag and sink.
///
/// The level-specific methods check the threshold before touching the pool:
/// a message below the threshold costs one comparison and yields an inert
/// handle.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use kvpool::{Appender, Level, LoggerPool};
///
/// let pool = LoggerPool::new(16, Level::Warn, true, 4096, None, Arc::new(Appender::stdout()));
/// assert!(pool.info("ignored").is_noop());
/// assert!(!pool.warn("kept").is_noop());
/// ```
#[derive(Clone)]
pub struct LoggerPool {
    pool: Pool<KvLogger>,
    level: Level,
    requests: bool,
    appender: Arc<Appender>,
}

impl std::fmt::Debug for LoggerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerPool")
            .field("level", &self.level)
            .field("requests", &self.requests)
            .field("pool", &self.pool)
            .finish()
    }
}

impl LoggerPool {
    /// Creates a pool of at least `count` loggers.
    ///
    /// # Parameters
    ///
    /// * `count` - Warm loggers, rounded to the pool's bucket count
    /// * `level` - Lowest severity written
    /// * `requests` - Whether request lines are written
    /// * `max_size` - Maximum size of one line, newline included
    /// * `field` - Data written into every logger and marked fixed
    /// * `appender` - Sink for [`Logger::log`]
    pub fn new(
        count: usize,
        level: Level,
        requests: bool,
        max_size: usize,
        field: Option<Field>,
        appender: Arc<Appender>,
    ) -> Self {
        let sink = appender.clone();
        let pool = Pool::new(count, move |releaser| {
            let mut kv = KvLogger::new(max_size, level, requests, sink.clone(), Some(releaser));
            if let Some(field) = &field {
                kv.write_field(field);
                kv.fixed();
            }
            kv
        });

        Self {
            pool,
            level,
            requests,
            appender,
        }
    }

    /// Creates a pool from configuration, applying its defaults.
    pub fn from_config(
        config: &LogConfig,
        field: Option<Field>,
        appender: Arc<Appender>,
    ) -> Result<Self, ConfigError> {
        let level = config.level()?;
        config.format()?;
        Ok(Self::new(
            usize::from(config.pool_size()),
            level,
            config.requests(),
            config.max_size(),
            field,
            appender,
        ))
    }

    /// Takes a logger out of the pool without a level check.
    ///
    /// Used for multi-use loggers that log several messages, each gated by
    /// the logger itself.
    #[inline]
    pub fn checkout(&self) -> Logger {
        Logger::from_kv(self.pool.checkout())
    }

    /// Whether a message at `level` would be written.
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level != Level::None && self.level <= level
    }

    #[inline]
    fn gated(&self, level: Level, start: impl FnOnce(&mut Logger)) -> Logger {
        if !self.enabled(level) {
            return Logger::noop();
        }
        let mut logger = self.checkout();
        start(&mut logger);
        logger
    }

    pub fn info(&self, ctx: &str) -> Logger {
        self.gated(Level::Info, |l| {
            l.info(ctx);
        })
    }

    pub fn warn(&self, ctx: &str) -> Logger {
        self.gated(Level::Warn, |l| {
            l.warn(ctx);
        })
    }

    pub fn error(&self, ctx: &str) -> Logger {
        self.gated(Level::Error, |l| {
            l.error(ctx);
        })
    }

    pub fn fatal(&self, ctx: &str) -> Logger {
        self.gated(Level::Fatal, |l| {
            l.fatal(ctx);
        })
    }

    /// Starts a request line, unless request logging is off.
    pub fn request(&self, route: &str) -> Logger {
        if !self.requests {
            return Logger::noop();
        }
        let mut logger = self.checkout();
        logger.request(route);
        logger
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn requests(&self) -> bool {
        self.requests
    }

    /// Loggers currently queued in the pool.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// How often a checkout found its bucket empty.
    pub fn depleted(&self) -> u64 {
        self.pool.depleted()
    }

    /// Flushes the sink.
    pub fn flush(&self) -> io::Result<()> {
        self.appender.flush()
    }
}
