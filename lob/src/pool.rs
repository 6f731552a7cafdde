//! Size-class pool for spill-buffer blocks
//!
//! A single pre-allocated region of [`Level`] slots, carved into
//! power-of-two blocks from 16 levels up to 2^15. Freed blocks go onto a
//! per-class LIFO free list whose link lives in the first bytes of the
//! block itself. Allocation is a free-list pop or a bump of the watermark;
//! both are O(1).
//!
//! The pool is single-threaded: interior state lives in [`Cell`]s so many
//! books on one thread can share it through an `Rc`, and the raw region
//! keeps the type `!Send` and `!Sync`.

use common::{Level, Price, Qty};
use std::alloc::{alloc, dealloc, Layout};
use std::cell::Cell;
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};
use thiserror::Error;

/// Number of size classes (16, 32, ..., 32768 levels)
const NUM_CLASSES: usize = 12;
/// Smallest block, in levels
const MIN_BLOCK: usize = 16;

/// Errors from pool construction
#[derive(Debug, Error)]
pub enum PoolError {
    /// Requested capacity cannot hold even one minimum block
    #[error("pool capacity {cap} is below the minimum block of {min} levels")]
    CapacityTooSmall {
        /// Requested capacity in levels
        cap: usize,
        /// Minimum supported capacity
        min: usize,
    },
    /// The backing region could not be allocated
    #[error("pool region allocation of {bytes} bytes failed")]
    AllocFailed {
        /// Size of the attempted allocation
        bytes: usize,
    },
}

/// Fixed-size pool of `Level` blocks with power-of-two size classes.
pub struct LevelPool<P: Price, Q: Qty> {
    region: NonNull<Level<P, Q>>,
    region_cap: usize,
    watermark: Cell<usize>,
    // Free-list heads per class: offset into the region, -1 when empty.
    free_heads: [Cell<i64>; NUM_CLASSES],
    alloc_failures: Cell<u64>,
}

impl<P: Price, Q: Qty> fmt::Debug for LevelPool<P, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelPool")
            .field("region_cap", &self.region_cap)
            .field("watermark", &self.watermark.get())
            .field("alloc_failures", &self.alloc_failures.get())
            .finish()
    }
}

impl<P: Price, Q: Qty> LevelPool<P, Q> {
    /// Pre-allocate a region of `total_cap` level slots.
    ///
    /// # Errors
    ///
    /// Fails if `total_cap` is below the minimum block size or the region
    /// cannot be allocated.
    pub fn new(total_cap: usize) -> Result<Self, PoolError> {
        if total_cap < MIN_BLOCK {
            return Err(PoolError::CapacityTooSmall {
                cap: total_cap,
                min: MIN_BLOCK,
            });
        }
        let bytes = total_cap
            .checked_mul(size_of::<Level<P, Q>>())
            .ok_or(PoolError::AllocFailed { bytes: usize::MAX })?;
        let layout = Layout::from_size_align(bytes, align_of::<Level<P, Q>>())
            .map_err(|_| PoolError::AllocFailed { bytes })?;
        // SAFETY: layout has non-zero size (total_cap >= MIN_BLOCK).
        let raw = unsafe { alloc(layout) };
        let Some(region) = NonNull::new(raw.cast::<Level<P, Q>>()) else {
            return Err(PoolError::AllocFailed { bytes });
        };
        Ok(Self {
            region,
            region_cap: total_cap,
            watermark: Cell::new(0),
            free_heads: [const { Cell::new(-1) }; NUM_CLASSES],
            alloc_failures: Cell::new(0),
        })
    }

    /// Class index for a requested capacity
    #[must_use]
    pub fn size_class(cap: usize) -> usize {
        if cap <= MIN_BLOCK {
            return 0;
        }
        // ceil(log2(cap)) - log2(MIN_BLOCK)
        let bits = usize::BITS - (cap - 1).leading_zeros();
        let cls = bits.saturating_sub(4) as usize;
        cls.min(NUM_CLASSES - 1)
    }

    /// Block size, in levels, for a class index
    #[must_use]
    pub const fn class_size(cls: usize) -> usize {
        MIN_BLOCK << cls
    }

    /// Allocate a block of at least `cap` levels, or `None` when exhausted.
    #[allow(clippy::cast_sign_loss)]
    pub fn allocate(&self, cap: usize) -> Option<NonNull<Level<P, Q>>> {
        let cls = Self::size_class(cap);
        let head = self.free_heads[cls].get();
        if head >= 0 {
            let off = head as usize;
            // SAFETY: off was produced by deallocate and lies inside the region;
            // the freed block's first bytes hold the next-offset link.
            unsafe {
                let blk = self.region.add(off);
                let next = blk.as_ptr().cast::<i64>().read_unaligned();
                self.free_heads[cls].set(next);
                return Some(blk);
            }
        }

        let actual = Self::class_size(cls);
        let wm = self.watermark.get();
        if wm + actual <= self.region_cap {
            self.watermark.set(wm + actual);
            // SAFETY: wm + actual <= region_cap keeps the block in bounds.
            return Some(unsafe { self.region.add(wm) });
        }

        self.alloc_failures.set(self.alloc_failures.get() + 1);
        tracing::trace!(cap, "level pool exhausted");
        None
    }

    /// Return a block to its class's free list.
    pub fn deallocate(&self, blk: NonNull<Level<P, Q>>, cap: usize) {
        let cls = Self::size_class(cap);
        // SAFETY: blk came from this pool, so the offset is in range; every
        // block spans at least MIN_BLOCK levels, wider than the i64 link.
        unsafe {
            let off = blk.as_ptr().offset_from(self.region.as_ptr());
            debug_assert!(off >= 0);
            blk.as_ptr()
                .cast::<i64>()
                .write_unaligned(self.free_heads[cls].get());
            self.free_heads[cls].set(off as i64);
        }
    }

    /// Grow a block: allocate `new_cap`, copy the first `used` levels,
    /// free the old block. On failure the old block stays owned by the
    /// caller and `None` is returned.
    pub fn reallocate(
        &self,
        old: Option<NonNull<Level<P, Q>>>,
        old_cap: usize,
        new_cap: usize,
        used: usize,
    ) -> Option<NonNull<Level<P, Q>>> {
        let new_blk = self.allocate(new_cap)?;
        if let Some(old) = old {
            // SAFETY: both blocks belong to this pool and `used` levels of
            // the old block are initialized; distinct blocks never overlap.
            unsafe {
                ptr::copy_nonoverlapping(old.as_ptr(), new_blk.as_ptr(), used);
            }
            self.deallocate(old, old_cap);
        }
        Some(new_blk)
    }

    /// Levels claimed from the region so far (free-listed blocks included)
    #[must_use]
    pub fn used_levels(&self) -> usize {
        self.watermark.get()
    }

    /// Total region capacity in levels
    #[must_use]
    pub fn total_levels(&self) -> usize {
        self.region_cap
    }

    /// Monotonic count of failed allocations
    #[must_use]
    pub fn alloc_failures(&self) -> u64 {
        self.alloc_failures.get()
    }
}

impl<P: Price, Q: Qty> Drop for LevelPool<P, Q> {
    fn drop(&mut self) {
        // SAFETY: the region was allocated in `new` with this exact layout.
        unsafe {
            let layout = Layout::from_size_align_unchecked(
                self.region_cap * size_of::<Level<P, Q>>(),
                align_of::<Level<P, Q>>(),
            );
            dealloc(self.region.as_ptr().cast(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Pool = LevelPool<i32, u32>;

    #[test]
    fn size_classes_round_up() {
        assert_eq!(Pool::size_class(1), 0);
        assert_eq!(Pool::size_class(16), 0);
        assert_eq!(Pool::size_class(17), 1);
        assert_eq!(Pool::size_class(32), 1);
        assert_eq!(Pool::size_class(33), 2);
        assert_eq!(Pool::size_class(64), 2);
        assert_eq!(Pool::size_class(65), 3);

        assert_eq!(Pool::class_size(0), 16);
        assert_eq!(Pool::class_size(1), 32);
        assert_eq!(Pool::class_size(2), 64);
        assert_eq!(Pool::class_size(11), 32768);
    }

    #[test]
    fn alloc_dealloc_reuses_freed_block() {
        let pool = Pool::new(1024).unwrap();
        assert_eq!(pool.used_levels(), 0);
        assert_eq!(pool.total_levels(), 1024);

        let p1 = pool.allocate(16).unwrap();
        assert_eq!(pool.used_levels(), 16);
        let p2 = pool.allocate(32).unwrap();
        assert_eq!(pool.used_levels(), 48);

        pool.deallocate(p1, 16);
        let p3 = pool.allocate(16).unwrap();
        assert_eq!(p3, p1, "free-list block should be reused");
        assert_eq!(pool.used_levels(), 48);

        pool.deallocate(p2, 32);
        pool.deallocate(p3, 16);
    }

    #[test]
    fn free_list_is_lifo() {
        let pool = Pool::new(256).unwrap();
        let blocks: Vec<_> = (0..8).map(|_| pool.allocate(16).unwrap()).collect();
        for blk in &blocks {
            pool.deallocate(*blk, 16);
        }
        for blk in blocks.iter().rev() {
            assert_eq!(pool.allocate(16).unwrap(), *blk);
        }
    }

    #[test]
    fn reallocate_copies_used_prefix() {
        let pool = Pool::new(4096).unwrap();

        let p1 = pool.reallocate(None, 0, 16, 0).unwrap();
        unsafe {
            p1.as_ptr().write(Level::new(100, 10));
            p1.as_ptr().add(1).write(Level::new(200, 20));
        }

        let p2 = pool.reallocate(Some(p1), 16, 32, 2).unwrap();
        unsafe {
            assert_eq!(p2.as_ptr().read(), Level::new(100, 10));
            assert_eq!(p2.as_ptr().add(1).read(), Level::new(200, 20));
        }
        pool.deallocate(p2, 32);
    }

    #[test]
    fn exhaustion_counts_failures_and_recovers_via_free_list() {
        let pool = Pool::new(32).unwrap();
        assert_eq!(pool.alloc_failures(), 0);

        let p1 = pool.allocate(16).unwrap();
        let p2 = pool.allocate(16).unwrap();

        assert!(pool.allocate(16).is_none());
        assert_eq!(pool.alloc_failures(), 1);

        pool.deallocate(p1, 16);
        let p4 = pool.allocate(16).unwrap();
        assert_eq!(p4, p1);
        assert_eq!(pool.alloc_failures(), 1);

        pool.deallocate(p2, 16);
        pool.deallocate(p4, 16);
    }

    #[test]
    fn rejects_tiny_capacity() {
        assert!(matches!(
            Pool::new(8),
            Err(PoolError::CapacityTooSmall { cap: 8, min: 16 })
        ));
    }

    #[test]
    fn realloc_failure_keeps_old_block() {
        let pool = Pool::new(32).unwrap();
        let p1 = pool.allocate(16).unwrap();
        unsafe { p1.as_ptr().write(Level::new(1, 2)) };

        // Growing to 32 needs a fresh block; only 16 levels remain.
        assert!(pool.reallocate(Some(p1), 16, 32, 1).is_none());
        assert_eq!(pool.alloc_failures(), 1);
        // Old data still intact and owned by the caller.
        unsafe { assert_eq!(p1.as_ptr().read(), Level::new(1, 2)) };
        pool.deallocate(p1, 16);
    }
}
