//! Direct-addressed price tape with a bitset summary
//!
//! The tape covers the closed price window `[anchor, anchor + N - 1]`.
//! `qty[i]` is the resting quantity at price `anchor + i`; bit `i` of the
//! summary is set iff `qty[i]` is non-zero. `best_idx` caches the most
//! favorable occupied index so best-price queries are a single load.

use crate::spill::Sink;
use common::{Price, Qty};
use serde::{Deserialize, Serialize};

/// Outcome of a single level update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateResult {
    /// A previously absent level was written
    Insert,
    /// An occupied level's quantity was overwritten
    Update,
    /// The level is absent after the call (including deleting an absent level)
    Erase,
    /// The price was out of window and was routed to the spill buffer
    Spill,
    /// The price is out of window and strictly better than the current best;
    /// the caller must recenter and retry. Never escapes [`crate::Book::set`].
    Promote,
}

/// One side's tape.
///
/// `N` is the window width in ticks (power of two, multiple of 64) and `W`
/// the number of 64-bit summary words; `W * 64` must equal `N`. `IS_BID`
/// selects the polarity: bids improve upward, asks downward.
#[derive(Debug, Clone)]
pub struct Tape<P: Price, Q: Qty, const N: usize, const W: usize, const IS_BID: bool> {
    qty: [Q; N],
    bits: [u64; W],
    anchor: P,
    best_idx: i32,
}

/// Invoke `f` with the index of every set bit in `bits[lo..=hi]`.
#[allow(clippy::cast_sign_loss)]
fn for_each_set(bits: &[u64], lo: i32, hi: i32, mut f: impl FnMut(usize)) {
    if lo > hi {
        return;
    }
    let (wl, wr) = ((lo >> 6) as usize, (hi >> 6) as usize);
    let left_mask = u64::MAX << (lo & 63);
    let right_mask = if (hi & 63) == 63 {
        u64::MAX
    } else {
        (1u64 << ((hi & 63) + 1)) - 1
    };
    for w in wl..=wr {
        let mut word = bits[w];
        if w == wl {
            word &= left_mask;
        }
        if w == wr {
            word &= right_mask;
        }
        while word != 0 {
            let off = word.trailing_zeros() as usize;
            f((w << 6) + off);
            word &= word - 1;
        }
    }
}

impl<P: Price, Q: Qty, const N: usize, const W: usize, const IS_BID: bool> Default
    for Tape<P, Q, N, W, IS_BID>
{
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_wrap)]
impl<P: Price, Q: Qty, const N: usize, const W: usize, const IS_BID: bool>
    Tape<P, Q, N, W, IS_BID>
{
    const GEOMETRY: () = assert!(
        N >= 64 && N.is_power_of_two() && W * 64 == N && N <= i32::MAX as usize,
        "tape width must be a power of two, a multiple of 64, and W * 64 == N"
    );

    const EMPTY_IDX: i32 = if IS_BID { -1 } else { N as i32 };

    /// Create an empty tape anchored at price zero.
    ///
    /// Call [`Tape::reset`] before use if a different window is needed.
    #[must_use]
    pub fn new() -> Self {
        let () = Self::GEOMETRY;
        Self {
            qty: [Q::ZERO; N],
            bits: [0; W],
            anchor: P::from_i64(0),
            best_idx: Self::EMPTY_IDX,
        }
    }

    /// Smallest anchor for which every window price stays representable
    #[must_use]
    pub fn min_valid_anchor() -> P {
        P::from_i64(P::NO_BID.as_i64() + (N as i64 - 1))
    }

    /// Largest anchor for which `anchor + N - 1` stays representable
    #[must_use]
    pub fn max_valid_anchor() -> P {
        P::from_i64(P::NO_ASK.as_i64() - (N as i64 - 1))
    }

    /// Zero every level and re-anchor the window.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is outside the valid anchor range.
    pub fn reset(&mut self, anchor: P) {
        assert!(
            anchor >= Self::min_valid_anchor() && anchor <= Self::max_valid_anchor(),
            "anchor {anchor} outside valid range"
        );
        self.qty = [Q::ZERO; N];
        self.bits = [0; W];
        self.anchor = anchor;
        self.best_idx = Self::EMPTY_IDX;
    }

    /// The price represented by index 0
    #[inline]
    #[must_use]
    pub fn anchor(&self) -> P {
        self.anchor
    }

    /// Window width in ticks
    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        N
    }

    /// Index of `px` within the window, if it is in range
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn idx_from_price(&self, px: P) -> Option<usize> {
        // Saturation keeps a wrapped 64-bit difference from landing in range.
        let d = px.as_i64().saturating_sub(self.anchor.as_i64());
        if (0..N as i64).contains(&d) {
            Some(d as usize)
        } else {
            None
        }
    }

    /// Price at window index `i`
    #[inline]
    fn price_from_idx(&self, i: i32) -> P {
        P::from_i64(self.anchor.as_i64() + i64::from(i))
    }

    /// Best in-window price, or the side's empty sentinel
    #[inline]
    #[must_use]
    pub fn best_px(&self) -> P {
        if self.is_empty() {
            if IS_BID { P::NO_BID } else { P::NO_ASK }
        } else {
            self.price_from_idx(self.best_idx)
        }
    }

    /// Quantity at the best in-window level, or zero when empty
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn best_qty(&self) -> Q {
        if self.is_empty() {
            Q::ZERO
        } else {
            self.qty[self.best_idx as usize]
        }
    }

    /// `true` when no in-window level is occupied
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if IS_BID {
            self.best_idx < 0
        } else {
            self.best_idx >= N as i32
        }
    }

    /// Set, overwrite, or delete the level at `px`.
    ///
    /// In-window updates mutate the tape directly. Out-of-window updates are
    /// pushed into `sink` unless the price is strictly better than the
    /// current best, in which case [`UpdateResult::Promote`] is returned
    /// without mutation and the caller is expected to recenter.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_qty(&mut self, px: P, q: Q, sink: &mut impl Sink<P, Q>) -> UpdateResult {
        let Some(i) = self.idx_from_price(px) else {
            if q.is_zero() {
                // Delete intent for a level we may have spilled earlier.
                sink.push::<IS_BID>(px, Q::ZERO);
                return UpdateResult::Spill;
            }
            if self.is_empty() {
                return UpdateResult::Promote;
            }
            let cur_best = self.best_px();
            let strictly_better = if IS_BID { px > cur_best } else { px < cur_best };
            if strictly_better {
                return UpdateResult::Promote;
            }
            sink.push::<IS_BID>(px, q);
            return UpdateResult::Spill;
        };

        let w = i >> 6;
        let m = 1u64 << (i & 63);
        let idx = i as i32;

        if q.is_zero() {
            if self.qty[i].is_zero() {
                return UpdateResult::Erase;
            }
            self.qty[i] = Q::ZERO;
            self.bits[w] &= !m;
            if idx == self.best_idx {
                self.best_idx = if IS_BID {
                    self.scan_prev_set(idx - 1)
                } else {
                    self.scan_next_set(idx + 1)
                };
            }
            UpdateResult::Erase
        } else {
            let rc = if self.qty[i].is_zero() {
                UpdateResult::Insert
            } else {
                UpdateResult::Update
            };
            self.qty[i] = q;
            self.bits[w] |= m;
            if IS_BID {
                if idx > self.best_idx {
                    self.best_idx = idx;
                }
            } else if idx < self.best_idx {
                self.best_idx = idx;
            }
            rc
        }
    }

    /// Shift the window to `new_anchor`, spilling every displaced level.
    ///
    /// # Panics
    ///
    /// Panics if `new_anchor` is outside the valid anchor range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn recenter_to_anchor(&mut self, new_anchor: P, sink: &mut impl Sink<P, Q>) {
        assert!(
            new_anchor >= Self::min_valid_anchor() && new_anchor <= Self::max_valid_anchor(),
            "anchor {new_anchor} outside valid range"
        );
        // Saturation is safe: a clipped shift still lands in the no-overlap case.
        let d = new_anchor.as_i64().saturating_sub(self.anchor.as_i64());
        if d == 0 {
            return;
        }
        // unsigned_abs keeps |i64::MIN| well defined
        let abs_d = d.unsigned_abs();
        let anchor_i64 = self.anchor.as_i64();

        {
            let Self { qty, bits, .. } = self;
            let mut spill_one = |i: usize| {
                let q = qty[i];
                if q.is_zero() {
                    return;
                }
                sink.push::<IS_BID>(P::from_i64(anchor_i64 + i as i64), q);
                qty[i] = Q::ZERO;
            };

            if abs_d >= N as u64 {
                // No overlap: the whole window leaves.
                for_each_set(&bits[..], 0, N as i32 - 1, &mut spill_one);
            } else {
                let k = abs_d as usize;
                if d > 0 {
                    for_each_set(&bits[..], 0, k as i32 - 1, &mut spill_one);
                    // The wrapped cells are exactly the ones just zeroed.
                    qty.rotate_left(k);
                } else {
                    for_each_set(&bits[..], (N - k) as i32, N as i32 - 1, &mut spill_one);
                    qty.rotate_right(k);
                }
            }
        }

        self.anchor = new_anchor;
        self.rebuild_bits(0, W - 1);
        self.best_idx = if IS_BID {
            self.scan_prev_set(N as i32 - 1)
        } else {
            self.scan_next_set(0)
        };
    }

    /// Erase every in-window level at or better than `threshold`, then
    /// forward the threshold to the sink so spilled levels follow.
    #[allow(clippy::cast_possible_truncation)]
    pub fn erase_better(&mut self, threshold: P, sink: &mut impl Sink<P, Q>) {
        let off = threshold.as_i64().saturating_sub(self.anchor.as_i64());
        if IS_BID {
            if off < 0 {
                self.erase_range(0, N as i32 - 1);
            } else if off < N as i64 {
                self.erase_range(off as i32, N as i32 - 1);
            }
        } else if off >= N as i64 {
            self.erase_range(0, N as i32 - 1);
        } else if off >= 0 {
            self.erase_range(0, off as i32);
        }
        sink.erase_better::<IS_BID>(threshold);
    }

    /// Walk occupied levels from best to worst, then continue through the
    /// sink's pending levels. The combined sequence is not sorted across
    /// the seam; callers needing global order must collect and sort.
    #[allow(clippy::cast_sign_loss)]
    pub fn iterate_from_best(&self, mut f: impl FnMut(P, Q) -> bool, sink: &impl Sink<P, Q>) {
        let mut idx = self.best_idx;
        if IS_BID {
            while idx >= 0 {
                if !f(self.price_from_idx(idx), self.qty[idx as usize]) {
                    return;
                }
                idx = self.scan_prev_set(idx - 1);
            }
        } else {
            while idx < N as i32 {
                if !f(self.price_from_idx(idx), self.qty[idx as usize]) {
                    return;
                }
                idx = self.scan_next_set(idx + 1);
            }
        }
        sink.iterate_pending::<IS_BID, _>(&mut f);
    }

    /// Check bitset coherence, the cached best index, and the anchor range.
    #[must_use]
    pub fn verify_invariants(&self) -> bool {
        if self.anchor < Self::min_valid_anchor() || self.anchor > Self::max_valid_anchor() {
            return false;
        }
        for w in 0..W {
            let base = w << 6;
            let mut expect = 0u64;
            for b in 0..64 {
                expect |= u64::from(!self.qty[base + b].is_zero()) << b;
            }
            if self.bits[w] != expect {
                return false;
            }
        }
        let scan = if IS_BID {
            self.scan_prev_set(N as i32 - 1)
        } else {
            self.scan_next_set(0)
        };
        scan == self.best_idx
    }

    /// Zero `qty[start..=end]`, patch the summary words, and rescan the
    /// best index if it fell inside the erased range.
    #[allow(clippy::cast_sign_loss)]
    fn erase_range(&mut self, start: i32, end: i32) {
        if start > end {
            return;
        }
        {
            let Self { qty, bits, .. } = self;
            for_each_set(&bits[..], start, end, |i| qty[i] = Q::ZERO);
        }
        self.rebuild_bits((start >> 6) as usize, (end >> 6) as usize);
        if IS_BID {
            if self.best_idx >= start {
                self.best_idx = self.scan_prev_set(start - 1);
            }
        } else if self.best_idx <= end {
            self.best_idx = self.scan_next_set(end + 1);
        }
    }

    /// Recompute summary words `lo..=hi` from the quantity array.
    fn rebuild_bits(&mut self, lo: usize, hi: usize) {
        for w in lo..=hi {
            let base = w << 6;
            let mut mask = 0u64;
            for b in 0..64 {
                mask |= u64::from(!self.qty[base + b].is_zero()) << b;
            }
            self.bits[w] = mask;
        }
    }

    /// Largest set index `<= idx`, or -1
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn scan_prev_set(&self, idx: i32) -> i32 {
        if idx < 0 {
            return -1;
        }
        let mut wi = (idx >> 6) as usize;
        let bi = idx & 63;
        let mask = if bi == 63 {
            u64::MAX
        } else {
            (1u64 << (bi + 1)) - 1
        };
        let mut word = self.bits[wi] & mask;
        loop {
            if word != 0 {
                return ((wi as i32) << 6) + (63 - word.leading_zeros() as i32);
            }
            if wi == 0 {
                return -1;
            }
            wi -= 1;
            word = self.bits[wi];
        }
    }

    /// Smallest set index `>= idx`, or N
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn scan_next_set(&self, idx: i32) -> i32 {
        if idx >= N as i32 {
            return N as i32;
        }
        debug_assert!(idx >= 0);
        let mut wi = (idx >> 6) as usize;
        let mut word = self.bits[wi] & (u64::MAX << (idx & 63));
        loop {
            if word != 0 {
                return ((wi as i32) << 6) + word.trailing_zeros() as i32;
            }
            wi += 1;
            if wi == W {
                return N as i32;
            }
            word = self.bits[wi];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spill::NullSink;
    use common::Level;

    type BidTape = Tape<i32, u32, 256, 4, true>;
    type AskTape = Tape<i32, u32, 256, 4, false>;

    /// Sink that records pushes so tests can observe spill traffic.
    #[derive(Default)]
    struct RecordingSink {
        pushed: Vec<Level<i32, u32>>,
        erased_below: Vec<i32>,
    }

    impl Sink<i32, u32> for RecordingSink {
        fn push<const IS_BID: bool>(&mut self, px: i32, qty: u32) {
            self.pushed.push(Level::new(px, qty));
        }
        fn erase_better<const IS_BID: bool>(&mut self, threshold: i32) {
            self.erased_below.push(threshold);
        }
        fn iterate_pending<const IS_BID: bool, F: FnMut(i32, u32) -> bool>(&self, _f: F) {}
        fn clear(&mut self) {
            self.pushed.clear();
            self.erased_below.clear();
        }
    }

    #[test]
    fn insert_update_erase_cycle() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = NullSink;

        assert_eq!(t.set_qty(1005, 10, &mut sink), UpdateResult::Insert);
        assert_eq!(t.best_px(), 1005);
        assert_eq!(t.best_qty(), 10);

        assert_eq!(t.set_qty(1005, 15, &mut sink), UpdateResult::Update);
        assert_eq!(t.best_qty(), 15);

        assert_eq!(t.set_qty(1005, 0, &mut sink), UpdateResult::Erase);
        assert!(t.is_empty());
        assert_eq!(t.best_px(), i32::MIN);
        assert_eq!(t.best_qty(), 0);

        // Deleting an absent in-window level is still an erasure.
        assert_eq!(t.set_qty(1005, 0, &mut sink), UpdateResult::Erase);
        assert!(t.verify_invariants());
    }

    #[test]
    fn best_tracking_across_words() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = NullSink;

        // Levels in different summary words (indices 5, 70, 200).
        t.set_qty(1005, 1, &mut sink);
        t.set_qty(1070, 2, &mut sink);
        t.set_qty(1200, 3, &mut sink);
        assert_eq!(t.best_px(), 1200);

        t.set_qty(1200, 0, &mut sink);
        assert_eq!(t.best_px(), 1070);
        t.set_qty(1070, 0, &mut sink);
        assert_eq!(t.best_px(), 1005);
        t.set_qty(1005, 0, &mut sink);
        assert!(t.is_empty());
        assert!(t.verify_invariants());
    }

    #[test]
    fn ask_polarity_prefers_low() {
        let mut t = AskTape::new();
        t.reset(1000);
        let mut sink = NullSink;

        t.set_qty(1100, 10, &mut sink);
        t.set_qty(1050, 20, &mut sink);
        t.set_qty(1200, 30, &mut sink);
        assert_eq!(t.best_px(), 1050);
        assert_eq!(t.best_qty(), 20);

        t.set_qty(1050, 0, &mut sink);
        assert_eq!(t.best_px(), 1100);
        assert!(t.verify_invariants());
    }

    #[test]
    fn out_of_window_routes_to_sink() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();

        t.set_qty(1100, 10, &mut sink);
        // Worse than best and out of window: spill.
        assert_eq!(t.set_qty(500, 5, &mut sink), UpdateResult::Spill);
        assert_eq!(sink.pushed, vec![Level::new(500, 5)]);

        // Better than best and out of window: promote, no mutation.
        assert_eq!(t.set_qty(2000, 20, &mut sink), UpdateResult::Promote);
        assert_eq!(sink.pushed.len(), 1);
        assert_eq!(t.best_px(), 1100);

        // Out-of-window delete is a spill-side delete intent.
        assert_eq!(t.set_qty(500, 0, &mut sink), UpdateResult::Spill);
        assert_eq!(sink.pushed.last(), Some(&Level::new(500, 0)));
        assert!(t.verify_invariants());
    }

    #[test]
    fn empty_tape_promotes_any_out_of_window_insert() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        assert_eq!(t.set_qty(5000, 7, &mut sink), UpdateResult::Promote);
        assert_eq!(t.set_qty(10, 7, &mut sink), UpdateResult::Promote);
        assert!(sink.pushed.is_empty());
    }

    #[test]
    fn recenter_keeps_overlap_and_spills_the_rest() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();

        t.set_qty(1001, 1, &mut sink);
        t.set_qty(1100, 2, &mut sink);
        t.set_qty(1255, 3, &mut sink);

        // Move the anchor up by 100: 1001 leaves the window.
        t.recenter_to_anchor(1100, &mut sink);
        assert_eq!(t.anchor(), 1100);
        assert_eq!(sink.pushed, vec![Level::new(1001, 1)]);
        assert_eq!(t.idx_from_price(1100), Some(0));
        assert_eq!(t.best_px(), 1255);
        assert_eq!(t.best_qty(), 3);
        assert!(t.verify_invariants());

        // Move down by 50: nothing occupied leaves (top of window empty).
        sink.clear();
        t.recenter_to_anchor(1050, &mut sink);
        assert!(sink.pushed.is_empty());
        assert_eq!(t.best_px(), 1255);
        assert!(t.verify_invariants());
    }

    #[test]
    fn recenter_with_no_overlap_spills_everything() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        t.set_qty(1000, 1, &mut sink);
        t.set_qty(1255, 2, &mut sink);

        t.recenter_to_anchor(10_000, &mut sink);
        assert_eq!(sink.pushed, vec![Level::new(1000, 1), Level::new(1255, 2)]);
        assert!(t.is_empty());
        assert!(t.verify_invariants());
    }

    #[test]
    fn recenter_same_anchor_is_noop() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        t.set_qty(1005, 10, &mut sink);
        t.recenter_to_anchor(1000, &mut sink);
        assert!(sink.pushed.is_empty());
        assert_eq!(t.best_px(), 1005);
    }

    #[test]
    fn erase_better_bid_is_inclusive() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        t.set_qty(1000, 10, &mut sink);
        t.set_qty(1005, 15, &mut sink);
        t.set_qty(1010, 20, &mut sink);

        t.erase_better(1005, &mut sink);
        assert_eq!(t.best_px(), 1000);
        assert_eq!(t.best_qty(), 10);
        assert_eq!(sink.erased_below, vec![1005]);
        assert!(t.verify_invariants());
    }

    #[test]
    fn erase_better_threshold_below_window_clears_bid_tape() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        t.set_qty(1000, 10, &mut sink);
        t.set_qty(1200, 20, &mut sink);
        t.erase_better(900, &mut sink);
        assert!(t.is_empty());
        assert!(t.verify_invariants());
    }

    #[test]
    fn erase_better_threshold_above_window_touches_nothing_on_bid() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        t.set_qty(1000, 10, &mut sink);
        t.erase_better(5000, &mut sink);
        assert_eq!(t.best_px(), 1000);
        // The threshold is still forwarded for spilled levels.
        assert_eq!(sink.erased_below, vec![5000]);
    }

    #[test]
    fn erase_better_ask_mirrors() {
        let mut t = AskTape::new();
        t.reset(1000);
        let mut sink = RecordingSink::default();
        t.set_qty(1010, 10, &mut sink);
        t.set_qty(1015, 15, &mut sink);
        t.set_qty(1020, 20, &mut sink);

        t.erase_better(1015, &mut sink);
        assert_eq!(t.best_px(), 1020);
        assert_eq!(t.best_qty(), 20);
        assert!(t.verify_invariants());
    }

    #[test]
    fn iterate_from_best_order_and_early_stop() {
        let mut t = BidTape::new();
        t.reset(1000);
        let mut sink = NullSink;
        t.set_qty(1001, 1, &mut sink);
        t.set_qty(1100, 2, &mut sink);
        t.set_qty(1255, 3, &mut sink);

        let mut seen = Vec::new();
        t.iterate_from_best(
            |px, q| {
                seen.push((px, q));
                true
            },
            &sink,
        );
        assert_eq!(seen, vec![(1255, 3), (1100, 2), (1001, 1)]);

        seen.clear();
        t.iterate_from_best(
            |px, q| {
                seen.push((px, q));
                false
            },
            &sink,
        );
        assert_eq!(seen, vec![(1255, 3)]);
    }

    #[test]
    fn boundary_anchor_at_price_type_max() {
        type SmallTape = Tape<i32, u32, 64, 1, true>;
        let max_anchor = SmallTape::max_valid_anchor();
        assert_eq!(max_anchor, i32::MAX - 63);

        let mut t = SmallTape::new();
        t.reset(max_anchor);
        let mut sink = NullSink;
        assert_eq!(t.set_qty(i32::MAX, 10, &mut sink), UpdateResult::Insert);
        assert_eq!(t.set_qty(i32::MAX - 1, 5, &mut sink), UpdateResult::Insert);
        assert_eq!(t.best_px(), i32::MAX);
        assert_eq!(t.best_qty(), 10);
        assert!(t.verify_invariants());
    }

    #[test]
    fn boundary_anchor_at_price_type_min() {
        type SmallTape = Tape<i32, u32, 64, 1, false>;
        let min_anchor = SmallTape::min_valid_anchor();
        assert_eq!(min_anchor, i32::MIN + 63);

        let mut t = SmallTape::new();
        t.reset(min_anchor);
        let mut sink = NullSink;
        assert_eq!(t.set_qty(min_anchor, 10, &mut sink), UpdateResult::Insert);
        assert_eq!(t.set_qty(min_anchor + 1, 5, &mut sink), UpdateResult::Insert);
        assert_eq!(t.best_px(), min_anchor);
        assert!(t.verify_invariants());
    }

    #[test]
    #[should_panic(expected = "outside valid range")]
    fn reset_rejects_invalid_anchor() {
        let mut t = Tape::<i32, u32, 64, 1, true>::new();
        t.reset(i32::MAX);
    }

    #[test]
    fn i16_tape_has_no_index_overflow() {
        let mut t = Tape::<i16, u16, 64, 1, true>::new();
        t.reset(i16::MAX - 63);
        let mut sink = NullSink;
        assert_eq!(t.set_qty(i16::MAX, 9, &mut sink), UpdateResult::Insert);
        assert_eq!(t.best_px(), i16::MAX);
        // A price far below the window must not wrap into range.
        assert_eq!(t.set_qty(i16::MIN, 0, &mut sink), UpdateResult::Spill);
        assert!(t.verify_invariants());
    }
}
