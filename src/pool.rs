//! Sharded, lock-free object pool.
//!
//! This module provides a generic pool that keeps a guaranteed number of warm
//! items around and hands them out without funneling every caller through a
//! single queue. Items are spread over [`BUCKETS`] bounded queues; an atomic
//! round-robin counter picks the bucket for each checkout. When the selected
//! bucket happens to be empty the pool falls back to an overflow queue,
//! manufacturing a fresh item if that is empty too, and records the event in
//! a depletion counter.
//!
//! # Release
//!
//! Pooled items are handed a [`Releaser`] by the factory that creates them.
//! The releaser remembers where the item came from: items built while filling
//! a bucket go back to that bucket, items built on the fallback path go back
//! to the fallback queue. Releasing never blocks. If a bucket is somehow full
//! the item spills into the fallback queue instead.
//!
//! The fallback queue holds at most as many items as the buckets do. Items
//! released into a full fallback are handed back to the caller and dropped,
//! so a burst of checkouts does not stay allocated once it has passed.
//!
//! # Health
//!
//! [`Pool::depleted`] is the primary health signal. A steadily growing value
//! means the pool is under-provisioned for the load it sees.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Weak,
};

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;

/// Number of buckets a pool is sharded into. Must be a power of two.
pub const BUCKETS: usize = 8;

const BUCKET_MASK: usize = BUCKETS - 1;

type Factory<T> = dyn Fn(Releaser<T>) -> T + Send + Sync;

/// Where a released item goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Home {
    Bucket(usize),
    Fallback,
}

struct Shared<T> {
    buckets: [CachePadded<ArrayQueue<T>>; BUCKETS],
    fallback: ArrayQueue<T>,
    factory: Box<Factory<T>>,
    index: CachePadded<AtomicUsize>,
    depleted: CachePadded<AtomicU64>,
}

impl<T> Shared<T> {
    #[inline]
    fn put(&self, home: Home, item: T) -> Result<(), T> {
        let item = match home {
            Home::Bucket(index) => match self.buckets[index].push(item) {
                Ok(()) => return Ok(()),
                Err(item) => item,
            },
            Home::Fallback => item,
        };
        self.fallback.push(item)
    }
}

/// Handle given to every pooled item at creation time, used to hand the item
/// back to the pool it was drawn from.
///
/// A releaser holds a weak reference: once the pool itself is gone, releasing
/// gives the item back to the caller (so it can simply be dropped).
pub struct Releaser<T> {
    shared: Weak<Shared<T>>,
    home: Home,
}

impl<T> Clone for Releaser<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            home: self.home,
        }
    }
}

impl<T> std::fmt::Debug for Releaser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Releaser").field("home", &self.home).finish()
    }
}

impl<T> Releaser<T> {
    /// Returns `item` to the pool.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The item is queued for reuse
    /// * `Err(item)` - The owning pool has been dropped or has no room left;
    ///   the item is handed back
    #[inline]
    pub fn release(&self, item: T) -> Result<(), T> {
        match self.shared.upgrade() {
            Some(shared) => shared.put(self.home, item),
            None => Err(item),
        }
    }

    /// Whether this releaser returns items to the fallback queue rather than a bucket.
    pub fn is_fallback(&self) -> bool {
        self.home == Home::Fallback
    }
}

/// Generic sharded object pool.
///
/// Cloning a `Pool` is cheap and yields another handle to the same items.
///
/// # Example
///
/// ```rust
/// use kvpool::pool::{Pool, Releaser};
///
/// struct Scratch {
///     data: Vec<u8>,
///     releaser: Releaser<Scratch>,
/// }
///
/// let pool = Pool::new(16, |releaser| Scratch {
///     data: Vec::with_capacity(64),
///     releaser,
/// });
///
/// let mut scratch = pool.checkout();
/// scratch.data.extend_from_slice(b"hello");
/// scratch.data.clear();
/// let releaser = scratch.releaser.clone();
/// let _ = releaser.release(scratch);
/// assert_eq!(pool.len(), 16);
/// ```
pub struct Pool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len())
            .field("depleted", &self.depleted())
            .finish()
    }
}

impl<T> Pool<T> {
    /// Creates a pool holding at least `min` warm items.
    ///
    /// `min` is raised to [`BUCKETS`] if smaller and then rounded down to a
    /// multiple of [`BUCKETS`], so `Pool::new(100, ..)` keeps 96 warm items.
    /// Every bucket is filled up front by calling `factory` with that bucket's
    /// [`Releaser`].
    pub fn new<F>(min: usize, factory: F) -> Self
    where
        F: Fn(Releaser<T>) -> T + Send + Sync + 'static,
    {
        let per_bucket = min.max(BUCKETS) / BUCKETS;
        let warm = per_bucket * BUCKETS;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<T>>| {
            let buckets = std::array::from_fn(|index| {
                let bucket = ArrayQueue::new(per_bucket);
                for _ in 0..per_bucket {
                    let item = factory(Releaser {
                        shared: weak.clone(),
                        home: Home::Bucket(index),
                    });
                    // capacity is exactly per_bucket
                    let _ = bucket.push(item);
                }
                CachePadded::new(bucket)
            });

            Shared {
                buckets,
                fallback: ArrayQueue::new(warm),
                factory: Box::new(factory),
                index: CachePadded::new(AtomicUsize::new(0)),
                depleted: CachePadded::new(AtomicU64::new(0)),
            }
        });

        Self { shared }
    }

    /// Takes an item out of the pool. Never blocks and never fails.
    ///
    /// The bucket is chosen round-robin. If it is empty, the item comes from
    /// the fallback queue (or is freshly created) and the depletion counter is
    /// incremented.
    #[inline]
    pub fn checkout(&self) -> T {
        let shared = &*self.shared;
        let index = shared.index.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & BUCKET_MASK;
        if let Some(item) = shared.buckets[index].pop() {
            return item;
        }

        shared.depleted.fetch_add(1, Ordering::Relaxed);
        shared.fallback.pop().unwrap_or_else(|| {
            (shared.factory)(Releaser {
                shared: Arc::downgrade(&self.shared),
                home: Home::Fallback,
            })
        })
    }

    /// How often a checkout found its bucket empty.
    pub fn depleted(&self) -> u64 {
        self.shared.depleted.load(Ordering::Relaxed)
    }

    /// Number of items currently queued across all buckets.
    ///
    /// Buckets are summed one at a time, so the value is only a snapshot under
    /// concurrent use. Items parked in the fallback queue are not counted.
    pub fn len(&self) -> usize {
        self.shared.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    /// Number of items parked in the fallback queue.
    pub fn fallback_len(&self) -> usize {
        self.shared.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
