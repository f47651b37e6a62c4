//! Machine-readable error codes.
//!
//! Codes are stable integers so that log consumers can match on them without
//! parsing messages. They show up as `_code=` (and `_icode=` for wrapped errors)
//! in log lines and as the `code: N - ` prefix of displayed errors.

pub const ERR_INVALID_LOG_LEVEL: i32 = 3001;
pub const ERR_INVALID_LOG_FORMAT: i32 = 3002;
pub const ERR_BUFFER_CAPACITY_MAX: i32 = 3005;
pub const ERR_LOG_FACADE: i32 = 3006;
