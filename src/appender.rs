//! Output sink shared by all loggers of a pool.

use std::io;

use parking_lot::{Mutex, MutexGuard};

/// Mutex-guarded writer that finished log lines are written to.
///
/// Each line is written under the lock in a single `write_all`, so lines from
/// different threads never interleave. The writer is not buffered here; wrap
/// it in a [`io::BufWriter`] if the destination is slow and call
/// [`Appender::flush`] on shutdown.
pub struct Appender {
    wr: Mutex<Box<dyn io::Write + Send>>,
}

impl std::fmt::Debug for Appender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appender").finish_non_exhaustive()
    }
}

impl Appender {
    /// Creates an appender writing to `wr`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::io::{self, BufWriter};
    /// use kvpool::Appender;
    ///
    /// let appender = Appender::new(BufWriter::new(io::stderr()));
    /// appender.flush().ok();
    /// ```
    pub fn new<W: io::Write + Send + 'static>(wr: W) -> Self {
        Self {
            wr: Mutex::new(Box::new(wr)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Locks the writer for the duration of one line.
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn io::Write + Send>> {
        self.wr.lock()
    }

    pub fn flush(&self) -> io::Result<()> {
        self.wr.lock().flush()
    }
}

impl Default for Appender {
    fn default() -> Self {
        Self::stdout()
    }
}
