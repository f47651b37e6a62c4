//! Bounded, growable byte buffer.
//!
//! A [`Buffer`] pre-allocates its minimum size once and may grow up to a hard
//! maximum. Growth allocates a separate region; [`Buffer::reset`] drops that
//! region and goes back to the pre-allocated one, which bounds the long-term
//! footprint of pooled buffers to their minimum size.
//!
//! Writes past the maximum do not panic and do not write partially. They set
//! a sticky [`BufferError`] instead: every later write is a no-op and every
//! checked accessor reports the error until the buffer is reset. Callers can
//! therefore chain writes and only look at the result once.
//!
//! Hot paths that already know how much they are going to write can reserve
//! the room once with [`Buffer::reserve`] (or [`Buffer::write_pad`]) and then
//! push bytes through the returned [`Reservation`] without further capacity
//! checks.

use std::{
    io::{self, Read, Seek, SeekFrom, Write},
    mem,
};

use crate::{codes, error::StructuredError, pool::Releaser};

/// Failure of a buffer write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// A write needed `required` bytes but the buffer may hold at most `max`.
    #[error("code: 3005 - buffer maximum size")]
    CapacityExceeded { max: usize, required: usize },
}

impl BufferError {
    pub fn code(&self) -> i32 {
        match self {
            BufferError::CapacityExceeded { .. } => codes::ERR_BUFFER_CAPACITY_MAX,
        }
    }
}

impl From<BufferError> for StructuredError {
    fn from(err: BufferError) -> Self {
        let code = err.code();
        match err {
            BufferError::CapacityExceeded { max, required } => {
                StructuredError::new(code, "buffer maximum size")
                    .int("max", max as i64)
                    .int("req", required as i64)
            }
        }
    }
}

impl From<BufferError> for io::Error {
    fn from(err: BufferError) -> Self {
        io::Error::other(err)
    }
}

/// Growable byte buffer with a fixed pre-allocation and a hard maximum size.
pub struct Buffer {
    /// Sticky write failure. Cleared only by a reset.
    err: Option<BufferError>,

    /// Maximum number of bytes the buffer may hold.
    max: usize,

    /// Write cursor, which is also the logical length.
    pos: usize,

    /// Read cursor used by the [`Read`] implementation.
    read: usize,

    /// Region allocated at construction. Never reallocated.
    preallocated: Box<[u8]>,

    /// Larger region allocated on demand. `None` while `preallocated` is active.
    grown: Option<Box<[u8]>>,

    /// Set for buffers that belong to a pool.
    releaser: Option<Releaser<Buffer>>,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.pos)
            .field("capacity", &self.capacity())
            .field("max", &self.max)
            .field("err", &self.err)
            .finish()
    }
}

impl Drop for Buffer {
    /// Pooled buffers go back to their pool when dropped.
    fn drop(&mut self) {
        if let Some(releaser) = self.releaser.take() {
            let mut buffer = mem::replace(self, Buffer::detached());
            buffer.reset();
            buffer.releaser = Some(releaser.clone());
            if let Err(mut orphan) = releaser.release(buffer) {
                orphan.releaser = None;
            }
        }
    }
}

impl Buffer {
    /// Creates a buffer with `min` bytes allocated up front that may grow to `max`.
    ///
    /// `max` may be smaller than `min`; the buffer then never holds more than `max`.
    pub fn new(min: usize, max: usize) -> Self {
        Self::new_with(vec![0u8; min].into_boxed_slice(), max)
    }

    /// Creates a buffer that already contains `data`.
    ///
    /// `max` is raised to `data.len()` if smaller.
    pub fn containing(data: Vec<u8>, max: usize) -> Self {
        let pos = data.len();
        let mut buffer = Self::new_with(data.into_boxed_slice(), max.max(pos));
        buffer.pos = pos;
        buffer
    }

    fn new_with(preallocated: Box<[u8]>, max: usize) -> Self {
        Self {
            err: None,
            max,
            pos: 0,
            read: 0,
            preallocated,
            grown: None,
            releaser: None,
        }
    }

    /// Allocation-free placeholder, used while moving a buffer back into its pool.
    fn detached() -> Self {
        Self::new_with(Box::default(), 0)
    }

    pub(crate) fn pooled(min: usize, max: usize, releaser: Releaser<Buffer>) -> Self {
        let mut buffer = Self::new(min, max);
        buffer.releaser = Some(releaser);
        buffer
    }

    #[inline]
    fn data(&self) -> &[u8] {
        self.grown.as_deref().unwrap_or(&self.preallocated[..])
    }

    #[inline]
    fn data_mut(&mut self) -> &mut [u8] {
        match self.grown.as_deref_mut() {
            Some(grown) => grown,
            None => &mut self.preallocated[..],
        }
    }

    /// Number of bytes written.
    #[inline]
    pub fn len(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn set_max(&mut self, max: usize) {
        self.max = max;
    }

    /// Size of the active storage region (pre-allocated or grown).
    pub fn capacity(&self) -> usize {
        self.data().len()
    }

    /// Bytes that can still be written before hitting the maximum.
    #[inline]
    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.pos)
    }

    /// The sticky error, if a write has failed since the last reset.
    pub fn error(&self) -> Option<&BufferError> {
        self.err.as_ref()
    }

    /// Written bytes, or the sticky error.
    pub fn checked_bytes(&self) -> Result<&[u8], BufferError> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(self.ok_bytes()),
        }
    }

    /// Written bytes, ignoring any sticky error.
    ///
    /// Since failed writes never write partially, this is everything that was
    /// written before the first failure.
    #[inline]
    pub fn ok_bytes(&self) -> &[u8] {
        &self.data()[..self.pos]
    }

    /// Written bytes as a string (invalid UTF-8 is replaced), or the sticky error.
    pub fn string(&self) -> Result<String, BufferError> {
        self.checked_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Resets the buffer and hands out `n` bytes of raw storage.
    ///
    /// The returned bytes are not cleared and the write cursor is left at zero.
    pub fn take_bytes(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        self.reset();
        if !self.ensure_capacity(n) {
            return Err(self.sticky());
        }
        Ok(&mut self.data_mut()[..n])
    }

    /// Makes sure `n` more bytes can be written without growing.
    pub fn pad(&mut self, n: usize) -> Result<(), BufferError> {
        if !self.ensure_capacity(n) {
            return Err(self.sticky());
        }
        Ok(())
    }

    /// Reserves `n` bytes and returns the capability to write them unchecked.
    pub fn reserve(&mut self, n: usize) -> Result<Reservation<'_>, BufferError> {
        if !self.ensure_capacity(n) {
            return Err(self.sticky());
        }
        Ok(Reservation {
            buffer: self,
            remaining: n,
        })
    }

    /// Writes `data` and reserves `extra` more bytes for unchecked writes.
    pub fn write_pad(&mut self, data: &[u8], extra: usize) -> Result<Reservation<'_>, BufferError> {
        let Some(n) = data.len().checked_add(extra) else {
            return Err(self.overflow());
        };
        let mut reservation = self.reserve(n)?;
        reservation.write_slice(data);
        Ok(reservation)
    }

    /// Appends `data`, growing if needed.
    #[inline]
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize, BufferError> {
        if !self.ensure_capacity(data.len()) {
            return Err(self.sticky());
        }
        let pos = self.pos;
        let end = pos + data.len();
        self.data_mut()[pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    #[inline]
    pub fn write_str(&mut self, data: &str) -> Result<usize, BufferError> {
        self.write_bytes(data.as_bytes())
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<(), BufferError> {
        if !self.ensure_capacity(1) {
            return Err(self.sticky());
        }
        let pos = self.pos;
        self.data_mut()[pos] = byte;
        self.pos = pos + 1;
        Ok(())
    }

    /// Moves the write cursor back by `n` bytes.
    pub fn truncate(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
        self.read = self.read.min(self.pos);
    }

    /// Clears the buffer and restores the pre-allocated region.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.read = 0;
        self.err = None;
        self.grown = None;
    }

    /// Like [`Buffer::reset`], but keeps the first `keep` bytes.
    ///
    /// If the kept prefix lives in a grown region it is copied back into the
    /// pre-allocated one. A prefix larger than the pre-allocation keeps the
    /// grown region.
    pub fn reset_to(&mut self, keep: usize) {
        let keep = keep.min(self.pos);
        if let Some(grown) = self.grown.take() {
            if keep <= self.preallocated.len() {
                self.preallocated[..keep].copy_from_slice(&grown[..keep]);
            } else {
                self.grown = Some(grown);
            }
        }
        self.pos = keep;
        self.read = 0;
        self.err = None;
    }

    /// Hands a pooled buffer back to its pool. Plain buffers are just dropped.
    pub fn release(self) {
        drop(self);
    }

    /// Same as [`Buffer::release`].
    pub fn close(self) {
        self.release();
    }

    fn sticky(&self) -> BufferError {
        self.err
            .clone()
            .unwrap_or(BufferError::CapacityExceeded {
                max: self.max,
                required: self.pos,
            })
    }

    /// Fails a write whose size does not fit in a `usize`.
    fn overflow(&mut self) -> BufferError {
        if self.err.is_none() {
            self.err = Some(BufferError::CapacityExceeded {
                max: self.max,
                required: usize::MAX,
            });
        }
        self.sticky()
    }

    /// Ensures room for `n` more bytes, growing the active region if needed.
    ///
    /// Returns false (and sets the sticky error) when the maximum would be
    /// exceeded, or when a previous write already failed.
    fn ensure_capacity(&mut self, n: usize) -> bool {
        if self.err.is_some() {
            return false;
        }

        let max = self.max;
        let Some(required) = self.pos.checked_add(n) else {
            self.overflow();
            return false;
        };
        if required > max {
            self.err = Some(BufferError::CapacityExceeded { max, required });
            return false;
        }

        let len = self.data().len();
        if required <= len {
            return true;
        }

        let mut new_len = len * 2;
        if new_len < required {
            new_len = required;
        } else if new_len > max {
            new_len = max;
        }

        let mut grown = vec![0u8; new_len].into_boxed_slice();
        grown[..self.pos].copy_from_slice(&self.data()[..self.pos]);
        self.grown = Some(grown);
        true
    }
}

impl Write for Buffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(data)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Buffer {
    /// Drains written bytes from the read cursor.
    ///
    /// Once everything has been read, returns `Ok(0)` and rewinds the read
    /// cursor so the content can be read again.
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.err {
            return Err(err.clone().into());
        }

        let (pos, read) = (self.pos, self.read);
        if pos <= read {
            if !into.is_empty() {
                self.read = 0;
            }
            return Ok(0);
        }

        let n = into.len().min(pos - read);
        into[..n].copy_from_slice(&self.data()[read..read + n]);
        self.read = read + n;
        Ok(n)
    }
}

impl Seek for Buffer {
    /// Moves the write cursor. Positions beyond the active region are rejected.
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(offset) => self.pos as i128 + i128::from(offset),
            SeekFrom::End(offset) => self.data().len() as i128 + i128::from(offset),
        };

        if target < 0 || target > self.data().len().min(self.max) as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside of the buffer",
            ));
        }

        self.pos = target as usize;
        self.read = self.read.min(self.pos);
        Ok(self.pos as u64)
    }
}

/// Capability to write a number of bytes that was reserved up front.
///
/// Obtained from [`Buffer::reserve`] or [`Buffer::write_pad`]. Writes through a
/// reservation skip the capacity and error checks of the buffer; the
/// reservation only tracks how many reserved bytes are left.
#[derive(Debug)]
pub struct Reservation<'a> {
    buffer: &'a mut Buffer,
    remaining: usize,
}

impl Reservation<'_> {
    /// Reserved bytes not written yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        debug_assert!(self.remaining > 0, "reservation exhausted");
        let pos = self.buffer.pos;
        self.buffer.data_mut()[pos] = byte;
        self.buffer.pos = pos + 1;
        self.remaining = self.remaining.saturating_sub(1);
    }

    #[inline]
    pub fn write_slice(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.remaining, "reservation exhausted");
        let pos = self.buffer.pos;
        let end = pos + data.len();
        self.buffer.data_mut()[pos..end].copy_from_slice(data);
        self.buffer.pos = end;
        self.remaining = self.remaining.saturating_sub(data.len());
    }

    /// Lets `fill` write directly into the remaining reserved bytes.
    ///
    /// `fill` returns how many bytes it wrote; the cursor advances by that much
    /// (never past the reservation).
    pub fn write_with<F>(&mut self, fill: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let pos = self.buffer.pos;
        let data = self.buffer.data_mut();
        let end = pos.saturating_add(self.remaining).min(data.len());
        let n = fill(&mut data[pos..end]).min(end - pos);
        self.buffer.pos = pos + n;
        self.remaining -= n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn must_string(b: &Buffer) -> String {
        b.string().expect("buffer has an error")
    }

    fn is_preallocated(b: &Buffer) -> bool {
        b.grown.is_none()
    }

    #[test]
    fn test_containing() {
        let mut b = Buffer::containing(b"hello world".to_vec(), 20);
        assert_eq!(b.len(), 11);
        b.write_byte(b'!').unwrap();
        assert_eq!(must_string(&b), "hello world!");
    }

    #[test]
    fn test_write_no_grow() {
        let mut b = Buffer::new(10, 20);
        assert_eq!(b.len(), 0);
        assert_eq!(b.max(), 20);

        b.write_bytes(b"hello").unwrap();
        assert!(b.error().is_none());
        assert_eq!(must_string(&b), "hello");
        assert!(is_preallocated(&b));

        b.write_bytes(b"world").unwrap();
        assert_eq!(b.len(), 10);
        assert_eq!(must_string(&b), "helloworld");
        assert!(is_preallocated(&b));
    }

    #[test]
    fn test_write_byte_grow() {
        let mut b = Buffer::new(1, 20);
        b.write_byte(b'y').unwrap();
        assert!(is_preallocated(&b));
        b.write_byte(b'z').unwrap();
        assert_eq!(must_string(&b), "yz");
        assert!(!is_preallocated(&b));

        let mut b = Buffer::new(0, 20);
        b.write_byte(b'z').unwrap();
        assert_eq!(must_string(&b), "z");
    }

    #[test]
    fn test_write_grow() {
        let mut b = Buffer::new(8, 20);
        b.write_bytes(b"hello").unwrap();
        b.write_str(" world").unwrap();
        assert_eq!(must_string(&b), "hello world");
        assert!(!is_preallocated(&b));
    }

    #[test]
    fn test_grow_doubling() {
        let mut b = Buffer::new(4, 25);

        // double
        b.write_bytes(b"abcde").unwrap();
        assert_eq!(b.capacity(), 8);

        // need more than double, grow to exact
        b.write_bytes(b"it's over 9000").unwrap();
        assert_eq!(b.capacity(), 19);

        // double > max, go to max
        b.write_bytes(b"yes").unwrap();
        assert_eq!(b.capacity(), 25);
    }

    #[test]
    fn test_grow_max_size() {
        let mut b = Buffer::new(4, 8);
        let err = b.write_bytes(b"hello world").unwrap_err();
        assert_eq!(err.to_string(), "code: 3005 - buffer maximum size");
        assert_eq!(err.code(), 3005);
        assert_eq!(
            b.error(),
            Some(&BufferError::CapacityExceeded {
                max: 8,
                required: 11
            })
        );

        assert_eq!(b.string().unwrap_err().to_string(), "code: 3005 - buffer maximum size");
        assert_eq!(b.ok_bytes(), b"");
    }

    #[test]
    fn test_error_is_sticky() {
        let mut b = Buffer::new(4, 8);
        b.write_bytes(b"abc").unwrap();
        assert!(b.write_bytes(b"defghi").is_err());

        // would fit, but the buffer already failed
        assert!(b.write_byte(b'd').is_err());
        assert!(b.write_bytes(b"d").is_err());
        assert!(b.pad(1).is_err());
        assert_eq!(b.ok_bytes(), b"abc");
        assert!(b.checked_bytes().is_err());
    }

    // min is only what gets pre-allocated, max still applies
    #[test]
    fn test_max_less_than_min() {
        let mut b = Buffer::new(10, 5);
        b.write_bytes(b"over").unwrap();
        assert_eq!(must_string(&b), "over");

        assert!(b.write_bytes(b" 9000").is_err());
        assert_eq!(b.ok_bytes(), b"over");
        assert!(b.string().is_err());
    }

    #[test]
    fn test_reset_normal() {
        let mut b = Buffer::new(4, 8);
        b.write_byte(b'1').unwrap();

        b.reset();
        assert!(b.error().is_none());
        assert_eq!(b.len(), 0);
        assert_eq!(must_string(&b), "");
        assert_eq!(b.capacity(), 4);
    }

    #[test]
    fn test_reset_grown() {
        let mut b = Buffer::new(4, 8);
        let preallocated = b.preallocated.as_ptr();
        b.write_bytes(b"12345").unwrap();
        assert_eq!(b.capacity(), 8);

        b.reset();
        assert!(b.error().is_none());
        assert_eq!(must_string(&b), "");
        assert_eq!(b.capacity(), 4);
        assert_eq!(b.data().as_ptr(), preallocated);
    }

    #[test]
    fn test_reset_error() {
        let mut b = Buffer::new(4, 4);
        assert!(b.write_bytes(b"12345").is_err());

        b.reset();
        assert!(b.error().is_none());
        b.write_bytes(b"1234").unwrap();
        assert_eq!(must_string(&b), "1234");
    }

    #[test]
    fn test_reset_to_copies_prefix_back() {
        let mut b = Buffer::new(4, 16);
        b.write_bytes(b"ab").unwrap();
        b.write_bytes(b"cdefgh").unwrap();
        assert!(!is_preallocated(&b));

        b.reset_to(3);
        assert!(is_preallocated(&b));
        assert_eq!(must_string(&b), "abc");

        b.write_bytes(b"xyz").unwrap();
        assert_eq!(must_string(&b), "abcxyz");
    }

    #[test]
    fn test_reset_to_large_prefix_keeps_grown() {
        let mut b = Buffer::new(2, 16);
        b.write_bytes(b"abcdef").unwrap();
        b.reset_to(4);
        assert!(!is_preallocated(&b));
        assert_eq!(must_string(&b), "abcd");
    }

    #[test]
    fn test_take_bytes() {
        let mut b = Buffer::new(20, 40);
        b.write_byte(b'z').unwrap();

        let bytes = b.take_bytes(5).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(b.len(), 0);

        assert!(b.take_bytes(41).is_err());
    }

    #[test]
    fn test_write_pad() {
        let mut b = Buffer::new(4, 20);

        {
            // without padding, it would have doubled to 8
            let mut reservation = b.write_pad(b"12345678", 2).unwrap();
            assert_eq!(reservation.remaining(), 2);
            reservation.write_byte(b'9');
            reservation.write_byte(b'A');
            assert_eq!(reservation.remaining(), 0);
        }
        assert_eq!(b.capacity(), 10);
        assert_eq!(must_string(&b), "123456789A");
    }

    #[test]
    fn test_reserve_write_with() {
        let mut b = Buffer::new(2, 20);
        b.write_bytes(b"ab").unwrap();
        {
            let mut reservation = b.reserve(4).unwrap();
            let n = reservation.write_with(|out| {
                out[..3].copy_from_slice(b"cde");
                3
            });
            assert_eq!(n, 3);
            assert_eq!(reservation.remaining(), 1);
        }
        assert_eq!(must_string(&b), "abcde");

        assert!(b.reserve(16).is_err());
    }

    #[test]
    fn test_truncate() {
        let mut b = Buffer::new(4, 20);

        b.write_bytes(b"12345").unwrap();
        b.truncate(3);
        assert_eq!(must_string(&b), "12");
        b.truncate(1);
        assert_eq!(must_string(&b), "1");
        b.truncate(1);
        assert_eq!(must_string(&b), "");
        b.truncate(1);
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn test_pad() {
        let mut b = Buffer::new(10, 100);
        b.pad(20).unwrap();
        assert_eq!(b.len(), 0);
        assert_eq!(b.capacity(), 20);
        assert!(b.pad(101).is_err());
    }

    #[test]
    fn test_huge_sizes_fail_without_overflow() {
        let mut b = Buffer::new(4, 8);
        b.write_bytes(b"ab").unwrap();
        let err = b.pad(usize::MAX).unwrap_err();
        assert_eq!(err, BufferError::CapacityExceeded { max: 8, required: usize::MAX });
        assert!(b.write_byte(b'c').is_err());
        assert_eq!(b.ok_bytes(), b"ab");

        let mut b = Buffer::new(4, 8);
        assert!(b.write_pad(b"x", usize::MAX).is_err());
        assert!(b.error().is_some());
        assert!(b.is_empty());

        let mut b = Buffer::new(4, 8);
        b.write_byte(b'a').unwrap();
        assert!(b.reserve(usize::MAX).is_err());
        assert!(b.take_bytes(usize::MAX).is_err());
    }

    #[test]
    fn test_containing_more_than_max() {
        let mut b = Buffer::containing(b"hello world".to_vec(), 4);
        assert_eq!(b.max(), 11);
        assert_eq!(b.available(), 0);
        assert_eq!(must_string(&b), "hello world");
        assert!(b.write_byte(b'!').is_err());
    }

    #[test]
    fn test_reader() {
        let mut b = Buffer::new(6000, 7000);
        b.write_bytes(&[b'a'; 5000]).unwrap();

        let mut out = Vec::new();
        let n = io::copy(&mut b, &mut out).unwrap();
        assert_eq!(n, 5000);
        assert_eq!(out.len(), 5000);

        // the read cursor rewinds at the end, so the content can be replayed
        out.clear();
        let n = io::copy(&mut b, &mut out).unwrap();
        assert_eq!(n, 5000);

        b.reset();
        out.clear();
        let n = io::copy(&mut b, &mut out).unwrap();
        assert_eq!(n, 0);
        assert_eq!(out.len(), 0);
    }

    #[test]
    fn test_reader_reports_error() {
        let mut b = Buffer::new(2, 2);
        assert!(b.write_bytes(b"abc").is_err());
        let mut out = [0u8; 4];
        assert!(b.read(&mut out).is_err());
    }

    #[test]
    fn test_seek() {
        let mut b = Buffer::new(8, 8);
        b.write_bytes(b"hello").unwrap();

        b.seek(SeekFrom::Start(2)).unwrap();
        b.write_bytes(b"LLO").unwrap();
        assert_eq!(must_string(&b), "heLLO");

        b.seek(SeekFrom::Current(-1)).unwrap();
        assert_eq!(must_string(&b), "heLL");

        assert!(b.seek(SeekFrom::Start(9)).is_err());
        assert!(b.seek(SeekFrom::Current(-10)).is_err());
    }

    #[test]
    fn test_io_write() {
        let mut b = Buffer::new(4, 16);
        write!(b, "x={}", 42).unwrap();
        assert_eq!(must_string(&b), "x=42");

        assert!(write!(b, "{}", "a".repeat(20)).is_err());
    }

    #[test]
    fn test_structured_error() {
        let err = BufferError::CapacityExceeded {
            max: 8,
            required: 11,
        };
        let se = StructuredError::from(err);
        assert_eq!(se.code(), 3005);
        assert_eq!(se.to_string(), "code: 3005 - buffer maximum size");
        assert_eq!(se.get("max"), Some(&crate::error::Value::Int(8)));
        assert_eq!(se.get("req"), Some(&crate::error::Value::Int(11)));
    }

    proptest! {
        #[test]
        fn prop_writes_within_max_concatenate(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..16),
            min in 0usize..32,
        ) {
            let total: usize = chunks.iter().map(Vec::len).sum();
            let mut b = Buffer::new(min, total);
            for chunk in &chunks {
                b.write_bytes(chunk).unwrap();
            }
            prop_assert!(b.error().is_none());
            let expected = chunks.concat();
            prop_assert_eq!(b.checked_bytes().unwrap(), expected.as_slice());
        }

        #[test]
        fn prop_overflow_keeps_prefix(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..16), 1..16),
            max in 0usize..64,
        ) {
            let mut b = Buffer::new(4, max);
            let mut expected = Vec::new();
            let mut failed = false;
            for chunk in &chunks {
                let fits = !failed && expected.len() + chunk.len() <= max;
                let result = b.write_bytes(chunk);
                prop_assert_eq!(result.is_ok(), fits);
                if fits {
                    expected.extend_from_slice(chunk);
                } else {
                    failed = true;
                }
            }
            prop_assert_eq!(b.error().is_some(), failed);
            prop_assert_eq!(b.ok_bytes(), expected.as_slice());

            b.reset();
            prop_assert_eq!(b.capacity(), 4);
        }
    }
}
