//! Sorted overflow storage for out-of-window levels
//!
//! Each side keeps its spilled levels in one ascending price-sorted buffer.
//! The buffer starts empty, grows geometrically (16, 32, ...) up to a fixed
//! `max_cap`, and once full admits a better price only by evicting the
//! side's worst entry. Blocks come from an optional shared [`LevelPool`];
//! without one they come from the global allocator.

use crate::pool::LevelPool;
use common::{Level, Price, Qty};
use std::alloc::{alloc, dealloc, Layout};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::slice;

/// First allocation, in levels
const INITIAL_CAP: usize = 16;
/// Upper bound on `max_cap`; keeps every layout computation trivially in range
const MAX_SPILL_CAP: usize = 1 << 30;

/// Receiver for levels the tape pushes out of its window.
///
/// [`SpillBuffer`] is the real sink; [`NullSink`] discards everything and is
/// what the drain and promote-retry paths use so a recenter can never feed
/// the spill it is draining.
pub trait Sink<P: Price, Q: Qty> {
    /// Store `(px, qty)`; zero `qty` means "remove if present"
    fn push<const IS_BID: bool>(&mut self, px: P, qty: Q);
    /// Drop every stored level at or better than `threshold`
    fn erase_better<const IS_BID: bool>(&mut self, threshold: P);
    /// Walk stored levels in best-to-worst order until `f` returns `false`
    fn iterate_pending<const IS_BID: bool, F: FnMut(P, Q) -> bool>(&self, f: F);
    /// Forget every stored level
    fn clear(&mut self);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<P: Price, Q: Qty> Sink<P, Q> for NullSink {
    #[inline(always)]
    fn push<const IS_BID: bool>(&mut self, _px: P, _qty: Q) {}
    #[inline(always)]
    fn erase_better<const IS_BID: bool>(&mut self, _threshold: P) {}
    #[inline(always)]
    fn iterate_pending<const IS_BID: bool, F: FnMut(P, Q) -> bool>(&self, _f: F) {}
    #[inline(always)]
    fn clear(&mut self) {}
}

// cap is validated against MAX_SPILL_CAP, so size * cap stays in range
fn levels_layout<P: Price, Q: Qty>(cap: usize) -> Layout {
    unsafe {
        Layout::from_size_align_unchecked(cap * size_of::<Level<P, Q>>(), align_of::<Level<P, Q>>())
    }
}

/// One side's spill: levels sorted ascending by price, no duplicates,
/// no zero quantities.
pub struct SpillSide<P: Price, Q: Qty> {
    ptr: Option<NonNull<Level<P, Q>>>,
    len: usize,
    cap: usize,
    max_cap: usize,
    evictions: u64,
}

impl<P: Price, Q: Qty> fmt::Debug for SpillSide<P, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillSide")
            .field("len", &self.len)
            .field("cap", &self.cap)
            .field("max_cap", &self.max_cap)
            .field("evictions", &self.evictions)
            .finish()
    }
}

impl<P: Price, Q: Qty> SpillSide<P, Q> {
    pub(crate) fn new(max_cap: usize) -> Self {
        Self {
            ptr: None,
            len: 0,
            cap: 0,
            max_cap,
            evictions: 0,
        }
    }

    /// Stored levels, ascending by price
    #[must_use]
    pub fn levels(&self) -> &[Level<P, Q>] {
        match self.ptr {
            // Only the initialized prefix is ever exposed.
            Some(p) => unsafe { slice::from_raw_parts(p.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// Number of stored levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when nothing is spilled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current allocated capacity in levels
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Monotonic count of levels lost to eviction or a full-buffer drop
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Best stored price, or the side's empty sentinel
    #[must_use]
    pub fn best_px<const IS_BID: bool>(&self) -> P {
        let lv = self.levels();
        match lv.last() {
            None => {
                if IS_BID {
                    P::NO_BID
                } else {
                    P::NO_ASK
                }
            }
            Some(last) => {
                if IS_BID {
                    last.px
                } else {
                    lv[0].px
                }
            }
        }
    }

    /// Quantity at the best stored level, or zero
    #[must_use]
    pub fn best_qty<const IS_BID: bool>(&self) -> Q {
        let lv = self.levels();
        match lv.last() {
            None => Q::ZERO,
            Some(last) => {
                if IS_BID {
                    last.qty
                } else {
                    lv[0].qty
                }
            }
        }
    }

    /// Walk levels best-to-worst until `f` returns `false`
    pub fn iterate<const IS_BID: bool, F: FnMut(P, Q) -> bool>(&self, mut f: F) {
        let lv = self.levels();
        if IS_BID {
            for l in lv.iter().rev() {
                if !f(l.px, l.qty) {
                    return;
                }
            }
        } else {
            for l in lv {
                if !f(l.px, l.qty) {
                    return;
                }
            }
        }
    }

    /// `true` iff prices are strictly increasing
    #[must_use]
    pub fn is_strictly_sorted(&self) -> bool {
        self.levels().windows(2).all(|w| w[0].px < w[1].px)
    }

    /// `true` iff some entry carries a zero quantity
    #[must_use]
    pub fn has_zero_qty(&self) -> bool {
        self.levels().iter().any(|l| l.qty.is_zero())
    }

    fn lower_bound(&self, px: P) -> usize {
        self.levels().partition_point(|l| l.px < px)
    }

    /// Insert, overwrite, or delete the level at `px`, growing or evicting
    /// as needed. Zero `qty` removes the level if present.
    pub(crate) fn add_point<const IS_BID: bool>(
        &mut self,
        px: P,
        q: Q,
        pool: Option<&LevelPool<P, Q>>,
    ) {
        if self.len == self.cap && self.cap < self.max_cap {
            self.ensure_cap(pool);
        }

        let i = self.lower_bound(px);
        if i < self.len && self.levels()[i].px == px {
            if q.is_zero() {
                self.remove_at(i);
            } else {
                // Overwrite in place; ordering is untouched.
                let Some(base) = self.ptr else { return };
                unsafe { (*base.as_ptr().add(i)).qty = q };
            }
            return;
        }

        if q.is_zero() {
            return;
        }

        if self.len == self.cap {
            // At max_cap (or growth failed): admit only a strictly better
            // price, at the cost of the worst entry. Either way a level is
            // lost, which the counter records.
            self.evictions += 1;
            if self.cap == 0 {
                return;
            }
            if IS_BID {
                if px <= self.levels()[0].px {
                    return;
                }
                tracing::trace!(px = %px, "spill full, evicting worst bid");
                self.remove_at(0);
            } else {
                if px >= self.levels()[self.len - 1].px {
                    return;
                }
                tracing::trace!(px = %px, "spill full, evicting worst ask");
                self.len -= 1;
            }
        }

        let j = self.lower_bound(px);
        self.insert_at(j, Level::new(px, q));
    }

    /// Hand every level in `[lo, hi]` to `f`, then compact them away.
    pub(crate) fn drain_range<F: FnMut(P, Q)>(&mut self, lo: P, hi: P, mut f: F) {
        if self.len == 0 {
            return;
        }
        let l = self.lower_bound(lo);
        let mut r = l;
        while r < self.len && self.levels()[r].px <= hi {
            let lv = self.levels()[r];
            f(lv.px, lv.qty);
            r += 1;
        }
        if l < r {
            let keep = self.len - r;
            if keep > 0 {
                let Some(base) = self.ptr else { return };
                unsafe { ptr::copy(base.as_ptr().add(r), base.as_ptr().add(l), keep) };
            }
            self.len = l + keep;
        }
    }

    /// Keep only levels worse than `threshold` (stable)
    pub(crate) fn erase_better<const IS_BID: bool>(&mut self, threshold: P) {
        let len = self.len;
        if len == 0 {
            return;
        }
        let mut w = 0;
        {
            let lv = self.levels_mut();
            for i in 0..len {
                let keep = if IS_BID {
                    lv[i].px < threshold
                } else {
                    lv[i].px > threshold
                };
                if keep {
                    if w != i {
                        lv[w] = lv[i];
                    }
                    w += 1;
                }
            }
        }
        self.len = w;
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Return the backing block to the pool or the global allocator.
    pub(crate) fn release(&mut self, pool: Option<&LevelPool<P, Q>>) {
        if let Some(p) = self.ptr.take() {
            match pool {
                Some(pool) => pool.deallocate(p, self.cap),
                None => unsafe { dealloc(p.as_ptr().cast(), levels_layout::<P, Q>(self.cap)) },
            }
        }
        self.len = 0;
        self.cap = 0;
    }

    fn levels_mut(&mut self) -> &mut [Level<P, Q>] {
        match self.ptr {
            Some(p) => unsafe { slice::from_raw_parts_mut(p.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// Grow to the next power-of-two capacity, up to `max_cap`. On
    /// allocation failure the buffer silently stays at its current size.
    fn ensure_cap(&mut self, pool: Option<&LevelPool<P, Q>>) {
        let doubled = if self.cap == 0 { INITIAL_CAP } else { self.cap * 2 };
        let new_cap = doubled.min(self.max_cap);
        if new_cap <= self.cap {
            return;
        }
        match pool {
            Some(pool) => {
                if let Some(p) = pool.reallocate(self.ptr, self.cap, new_cap, self.len) {
                    self.ptr = Some(p);
                    self.cap = new_cap;
                }
            }
            None => {
                let layout = levels_layout::<P, Q>(new_cap);
                // SAFETY: layout is non-zero (new_cap >= INITIAL_CAP) and the
                // old block, if any, was allocated with the same element type.
                unsafe {
                    let raw = alloc(layout).cast::<Level<P, Q>>();
                    let Some(new_ptr) = NonNull::new(raw) else {
                        return;
                    };
                    if let Some(old) = self.ptr {
                        ptr::copy_nonoverlapping(old.as_ptr(), new_ptr.as_ptr(), self.len);
                        dealloc(old.as_ptr().cast(), levels_layout::<P, Q>(self.cap));
                    }
                    self.ptr = Some(new_ptr);
                    self.cap = new_cap;
                }
            }
        }
    }

    fn insert_at(&mut self, i: usize, lv: Level<P, Q>) {
        debug_assert!(self.len < self.cap && i <= self.len);
        let Some(base) = self.ptr else { return };
        // SAFETY: len < cap, so shifting the tail right by one stays in the block.
        unsafe {
            let src = base.as_ptr().add(i);
            ptr::copy(src, src.add(1), self.len - i);
            ptr::write(src, lv);
        }
        self.len += 1;
    }

    fn remove_at(&mut self, i: usize) {
        debug_assert!(i < self.len);
        let Some(base) = self.ptr else { return };
        // SAFETY: i < len, the shifted range is initialized.
        unsafe {
            let p = base.as_ptr();
            ptr::copy(p.add(i + 1), p.add(i), self.len - i - 1);
        }
        self.len -= 1;
    }
}

/// Both sides' spill plus the optional pool their blocks come from.
///
/// Owned by value inside a book, so a book move carries the raw blocks
/// along and the source has nothing left to double-free.
pub struct SpillBuffer<P: Price, Q: Qty> {
    /// Spilled bid levels
    pub bid: SpillSide<P, Q>,
    /// Spilled ask levels
    pub ask: SpillSide<P, Q>,
    pool: Option<Rc<LevelPool<P, Q>>>,
}

impl<P: Price, Q: Qty> fmt::Debug for SpillBuffer<P, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillBuffer")
            .field("bid", &self.bid)
            .field("ask", &self.ask)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl<P: Price, Q: Qty> SpillBuffer<P, Q> {
    /// Create both sides with the same `max_cap`.
    ///
    /// # Panics
    ///
    /// Panics unless `max_cap` is a power of two in `[1, 2^30]`.
    #[must_use]
    pub fn new(max_cap: usize, pool: Option<Rc<LevelPool<P, Q>>>) -> Self {
        assert!(
            max_cap >= 1 && max_cap <= MAX_SPILL_CAP && max_cap.is_power_of_two(),
            "spill max_cap must be a power of two, got {max_cap}"
        );
        Self {
            bid: SpillSide::new(max_cap),
            ask: SpillSide::new(max_cap),
            pool,
        }
    }

    /// Hand levels in `[lo, hi]` on one side to `f` and remove them.
    pub fn drain<const IS_BID: bool, F: FnMut(P, Q)>(&mut self, lo: P, hi: P, f: F) {
        if IS_BID {
            self.bid.drain_range(lo, hi, f);
        } else {
            self.ask.drain_range(lo, hi, f);
        }
    }

    /// Best spilled price on one side, or the side's empty sentinel
    #[must_use]
    pub fn best_px<const IS_BID: bool>(&self) -> P {
        if IS_BID {
            self.bid.best_px::<true>()
        } else {
            self.ask.best_px::<false>()
        }
    }

    /// Quantity at the best spilled level on one side, or zero
    #[must_use]
    pub fn best_qty<const IS_BID: bool>(&self) -> Q {
        if IS_BID {
            self.bid.best_qty::<true>()
        } else {
            self.ask.best_qty::<false>()
        }
    }

    /// Drop all spilled levels on both sides; allocations are kept.
    pub fn clear(&mut self) {
        self.bid.clear();
        self.ask.clear();
    }
}

impl<P: Price, Q: Qty> Sink<P, Q> for SpillBuffer<P, Q> {
    #[inline]
    fn push<const IS_BID: bool>(&mut self, px: P, qty: Q) {
        let pool = self.pool.as_deref();
        if IS_BID {
            self.bid.add_point::<true>(px, qty, pool);
        } else {
            self.ask.add_point::<false>(px, qty, pool);
        }
    }

    #[inline]
    fn erase_better<const IS_BID: bool>(&mut self, threshold: P) {
        if IS_BID {
            self.bid.erase_better::<true>(threshold);
        } else {
            self.ask.erase_better::<false>(threshold);
        }
    }

    #[inline]
    fn iterate_pending<const IS_BID: bool, F: FnMut(P, Q) -> bool>(&self, f: F) {
        if IS_BID {
            self.bid.iterate::<true, F>(f);
        } else {
            self.ask.iterate::<false, F>(f);
        }
    }

    #[inline]
    fn clear(&mut self) {
        Self::clear(self);
    }
}

impl<P: Price, Q: Qty> Drop for SpillBuffer<P, Q> {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        self.bid.release(pool.as_deref());
        self.ask.release(pool.as_deref());
    }
}
