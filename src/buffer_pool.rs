//! Pool of [`Buffer`]s.

use crate::{buffer::Buffer, config::BufferPoolConfig, pool::Pool};

/// Sharded pool of bounded buffers.
///
/// Buffers return to the pool when dropped (or on [`Buffer::release`]) and
/// are reset on the way back, so every checkout starts empty at its
/// pre-allocated size.
///
/// # Example
///
/// ```rust
/// use kvpool::BufferPool;
///
/// let pool = BufferPool::new(8, 64, 1024);
/// let mut buffer = pool.checkout();
/// buffer.write_str("hello").unwrap();
/// assert_eq!(pool.len(), 7);
/// drop(buffer);
/// assert_eq!(pool.len(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct BufferPool {
    pool: Pool<Buffer>,
    max: usize,
}

impl BufferPool {
    /// Creates `count` buffers, each pre-allocating `min` bytes and allowed
    /// to grow to `max`.
    pub fn new(count: usize, min: usize, max: usize) -> Self {
        Self {
            pool: Pool::new(count, move |releaser| Buffer::pooled(min, max, releaser)),
            max,
        }
    }

    pub fn from_config(config: &BufferPoolConfig) -> Self {
        Self::new(
            usize::from(config.count),
            config.min as usize,
            config.max as usize,
        )
    }

    /// Takes a buffer with the pool's maximum size.
    #[inline]
    pub fn checkout(&self) -> Buffer {
        self.checkout_max(self.max)
    }

    /// Takes a buffer that may grow to `max` for this checkout only.
    #[inline]
    pub fn checkout_max(&self, max: usize) -> Buffer {
        let mut buffer = self.pool.checkout();
        buffer.set_max(max);
        buffer
    }

    /// Buffers currently queued.
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
}
