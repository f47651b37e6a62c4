//! Deserializable configuration for loggers and buffer pools.
//!
//! Both structs accept partial input: every field has a default and unknown
//! values are only rejected when the configuration is applied.
//!
//! ```json
//! {
//!   "level": "info",
//!   "format": "kv",
//!   "pool_size": 64,
//!   "requests": false,
//!   "kv": { "max_size": 8192 }
//! }
//! ```

use std::fmt;

use serde::Deserialize;

use crate::{codes, logger::Level};

const DEFAULT_POOL_SIZE: u16 = 100;
const DEFAULT_KV_MAX_SIZE: u32 = 128 * 1024;

/// Configuration could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("code: 3001 - log.level is invalid. Should be one of: INFO, WARN, ERROR, FATAL or NONE")]
    InvalidLevel(String),
    #[error("code: 3002 - log.format is invalid. Should be one of: kv")]
    InvalidFormat(String),
    #[error("code: 3006 - {0}")]
    SetLogger(#[from] log::SetLoggerError),
}

impl ConfigError {
    pub fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidLevel(_) => codes::ERR_INVALID_LOG_LEVEL,
            ConfigError::InvalidFormat(_) => codes::ERR_INVALID_LOG_FORMAT,
            ConfigError::SetLogger(_) => codes::ERR_LOG_FACADE,
        }
    }
}

/// Output format of a logger pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `key=value` lines.
    #[default]
    Kv,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Kv => "KV",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger pool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether request lines are written. Unset means yes.
    pub requests: Option<bool>,
    /// `INFO`, `WARN`, `ERROR`, `FATAL` or `NONE`, any case. Empty means `WARN`.
    pub level: String,
    /// Only `kv` is supported. Empty means `kv`.
    pub format: String,
    /// Warm loggers. Zero means 100.
    pub pool_size: u16,
    pub kv: KvConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// Maximum size of one line in bytes. Zero means 128KB.
    pub max_size: u32,
}

impl LogConfig {
    /// The configured threshold.
    pub fn level(&self) -> Result<Level, ConfigError> {
        if self.level.is_empty() {
            return Ok(Level::Warn);
        }
        self.level
            .parse()
            .map_err(|_| ConfigError::InvalidLevel(self.level.clone()))
    }

    pub fn format(&self) -> Result<Format, ConfigError> {
        if self.format.is_empty() || self.format.eq_ignore_ascii_case("kv") {
            return Ok(Format::Kv);
        }
        Err(ConfigError::InvalidFormat(self.format.clone()))
    }

    pub fn pool_size(&self) -> u16 {
        match self.pool_size {
            0 => DEFAULT_POOL_SIZE,
            n => n,
        }
    }

    pub fn requests(&self) -> bool {
        self.requests.unwrap_or(true)
    }

    pub fn max_size(&self) -> usize {
        match self.kv.max_size {
            0 => DEFAULT_KV_MAX_SIZE as usize,
            n => n as usize,
        }
    }
}

/// Buffer pool configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Warm buffers, rounded to the pool's bucket count.
    pub count: u16,
    /// Bytes pre-allocated per buffer.
    pub min: u32,
    /// Bytes a buffer may grow to.
    pub max: u32,
}
