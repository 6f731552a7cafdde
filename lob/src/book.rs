//! Book controller: two tapes, one spill, promote/recenter/drain
//!
//! The controller owns one tape per side (anchors are independent) and the
//! spill buffer both tapes overflow into. Its `set` is the hot path: the
//! tape handles in-window updates directly, and on a promote the
//! controller recenters the tape around the new price, drains the spill
//! entries that fell back in range, and retries the update against a null
//! sink so the sequence always terminates.

use crate::pool::LevelPool;
use crate::spill::{NullSink, SpillBuffer};
use crate::tape::{Tape, UpdateResult};
use common::{Price, Qty, Side};
use std::rc::Rc;

/// Anchor that centers a window of width `N` a given `offset` below `px`,
/// clamped into the valid anchor range.
fn anchor_for<P: Price, const N: usize>(px: P, offset: i64) -> P {
    let min_px = P::NO_BID.as_i64();
    let max_px = P::NO_ASK.as_i64();
    let min_anchor = min_px + (N as i64 - 1);
    let max_anchor = max_px - (N as i64 - 1);
    let raw = if px.as_i64() < min_px + offset {
        // px - offset would underflow the price type
        min_px
    } else {
        px.as_i64() - offset
    };
    P::from_i64(raw.clamp(min_anchor, max_anchor))
}

/// Drain spill levels that lie inside the tape's current window back into
/// the tape. Writes go through a null sink: a drain must never spill.
fn drain_into<P: Price, Q: Qty, const N: usize, const W: usize, const IS_BID: bool>(
    tape: &mut Tape<P, Q, N, W, IS_BID>,
    spill: &mut SpillBuffer<P, Q>,
) {
    let lo = tape.anchor();
    let hi = P::from_i64(lo.as_i64() + (N as i64 - 1));
    spill.drain::<IS_BID, _>(lo, hi, |px, q| {
        let _ = tape.set_qty(px, q, &mut NullSink);
    });
}

/// Apply one update to a tape, resolving a promote by recentering the
/// window on the new price, draining the spill, and retrying.
fn set_on<P: Price, Q: Qty, const N: usize, const W: usize, const IS_BID: bool>(
    tape: &mut Tape<P, Q, N, W, IS_BID>,
    spill: &mut SpillBuffer<P, Q>,
    px: P,
    q: Q,
) -> UpdateResult {
    let rc = tape.set_qty(px, q, spill);
    if rc != UpdateResult::Promote {
        return rc;
    }

    // Center the new window on the price, then pin it so the price is
    // guaranteed in-window even at the clamped edges.
    let mut anchor = anchor_for::<P, N>(px, N as i64 / 2);
    let min_anchor = anchor_for::<P, N>(px, N as i64 - 1);
    if anchor < min_anchor {
        anchor = min_anchor;
    }
    if anchor > px {
        anchor = px;
    }

    tracing::debug!(px = %px, anchor = %anchor, bid = IS_BID, "promote: recentering tape");
    tape.recenter_to_anchor(anchor, spill);
    drain_into(tape, spill);
    tape.set_qty(px, q, &mut NullSink)
}

/// A price-level book: bid and ask tapes over a shared spill buffer.
///
/// `N` is the per-side tape width and `W = N / 64` its summary word count.
/// Books move but do not clone; the spill owns raw blocks exclusively.
#[derive(Debug)]
pub struct Book<P: Price, Q: Qty, const N: usize, const W: usize> {
    bids: Tape<P, Q, N, W, true>,
    asks: Tape<P, Q, N, W, false>,
    spill: SpillBuffer<P, Q>,
}

/// 1024-wide book over 32-bit prices
pub type Book32 = Book<i32, u32, 1024, 16>;
/// 1024-wide book over 64-bit prices
pub type Book64 = Book<i64, u64, 1024, 16>;

impl<P: Price, Q: Qty, const N: usize, const W: usize> Book<P, Q, N, W> {
    /// Create a book whose spill sides grow up to `max_cap` levels each,
    /// backed by the global allocator.
    ///
    /// # Panics
    ///
    /// Panics unless `max_cap` is a power of two.
    #[must_use]
    pub fn new(max_cap: usize) -> Self {
        Self::with_pool(max_cap, None)
    }

    /// Like [`Book::new`], but spill blocks come from `pool` when given.
    ///
    /// # Panics
    ///
    /// Panics unless `max_cap` is a power of two.
    #[must_use]
    pub fn with_pool(max_cap: usize, pool: Option<Rc<LevelPool<P, Q>>>) -> Self {
        Self {
            bids: Tape::new(),
            asks: Tape::new(),
            spill: SpillBuffer::new(max_cap, pool),
        }
    }

    /// Valid anchor centered `offset` below `px`; exposed for sizing and tests
    #[must_use]
    pub fn compute_anchor(px: P, offset: i64) -> P {
        anchor_for::<P, N>(px, offset)
    }

    /// Clear both sides and re-anchor both tapes at `anchor`.
    /// Spill allocations are kept.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is outside the valid anchor range.
    pub fn reset(&mut self, anchor: P) {
        self.bids.reset(anchor);
        self.asks.reset(anchor);
        self.spill.clear();
    }

    /// Reset one side so `mid_px` sits at the middle of its window.
    pub fn reset_at_mid<const IS_BID: bool>(&mut self, mid_px: P) {
        let anchor = anchor_for::<P, N>(mid_px, N as i64 / 2);
        if IS_BID {
            self.bids.reset(anchor);
        } else {
            self.asks.reset(anchor);
        }
    }

    /// Set, overwrite, or delete (`q == 0`) the level at `px`.
    ///
    /// Never returns [`UpdateResult::Promote`]; promotes are resolved
    /// internally by recentering.
    #[inline]
    pub fn set(&mut self, side: Side, px: P, q: Q) -> UpdateResult {
        match side {
            Side::Bid => self.set_side::<true>(px, q),
            Side::Ask => self.set_side::<false>(px, q),
        }
    }

    /// Polarity-typed variant of [`Book::set`] for hot loops.
    #[inline]
    pub fn set_side<const IS_BID: bool>(&mut self, px: P, q: Q) -> UpdateResult {
        if IS_BID {
            set_on(&mut self.bids, &mut self.spill, px, q)
        } else {
            set_on(&mut self.asks, &mut self.spill, px, q)
        }
    }

    /// Erase every level at or better than `threshold` on one side,
    /// in the tape and in the spill.
    pub fn erase_better(&mut self, side: Side, threshold: P) {
        match side {
            Side::Bid => self.erase_better_side::<true>(threshold),
            Side::Ask => self.erase_better_side::<false>(threshold),
        }
    }

    /// Polarity-typed variant of [`Book::erase_better`].
    pub fn erase_better_side<const IS_BID: bool>(&mut self, threshold: P) {
        if IS_BID {
            self.bids.erase_better(threshold, &mut self.spill);
        } else {
            self.asks.erase_better(threshold, &mut self.spill);
        }
    }

    /// Force the bid tape onto `new_anchor` and drain newly in-window
    /// spill levels back in.
    ///
    /// # Panics
    ///
    /// Panics if `new_anchor` is outside the valid anchor range.
    pub fn recenter_bid(&mut self, new_anchor: P) {
        self.bids.recenter_to_anchor(new_anchor, &mut self.spill);
        drain_into(&mut self.bids, &mut self.spill);
    }

    /// Ask-side counterpart of [`Book::recenter_bid`].
    ///
    /// # Panics
    ///
    /// Panics if `new_anchor` is outside the valid anchor range.
    pub fn recenter_ask(&mut self, new_anchor: P) {
        self.asks.recenter_to_anchor(new_anchor, &mut self.spill);
        drain_into(&mut self.asks, &mut self.spill);
    }

    /// Best bid across tape and spill, or [`Price::NO_BID`]
    #[inline]
    #[must_use]
    pub fn best_bid_px(&self) -> P {
        let tape_best = self.bids.best_px();
        let spill_best = self.spill.best_px::<true>();
        if tape_best > spill_best {
            tape_best
        } else {
            spill_best
        }
    }

    /// Best ask across tape and spill, or [`Price::NO_ASK`]
    #[inline]
    #[must_use]
    pub fn best_ask_px(&self) -> P {
        let tape_best = self.asks.best_px();
        let spill_best = self.spill.best_px::<false>();
        if tape_best < spill_best {
            tape_best
        } else {
            spill_best
        }
    }

    /// Quantity at the best bid; ties prefer the tape
    #[inline]
    #[must_use]
    pub fn best_bid_qty(&self) -> Q {
        let tape_best = self.bids.best_px();
        let spill_best = self.spill.best_px::<true>();
        if tape_best >= spill_best {
            self.bids.best_qty()
        } else {
            self.spill.best_qty::<true>()
        }
    }

    /// Quantity at the best ask; ties prefer the tape
    #[inline]
    #[must_use]
    pub fn best_ask_qty(&self) -> Q {
        let tape_best = self.asks.best_px();
        let spill_best = self.spill.best_px::<false>();
        if tape_best <= spill_best {
            self.asks.best_qty()
        } else {
            self.spill.best_qty::<false>()
        }
    }

    /// `true` when both sides exist and the best bid is at or above the
    /// best ask
    #[must_use]
    pub fn crossed(&self) -> bool {
        let b = self.best_bid_px();
        let a = self.best_ask_px();
        b != P::NO_BID && a != P::NO_ASK && b >= a
    }

    /// Tape-only crossedness; cheap when the spill is known empty
    #[must_use]
    pub fn crossed_on_tape(&self) -> bool {
        let b = self.bids.best_px();
        let a = self.asks.best_px();
        b != P::NO_BID && a != P::NO_ASK && b >= a
    }

    /// Midpoint of the inside prices, when both sides exist
    #[must_use]
    pub fn mid_px(&self) -> Option<P> {
        let b = self.best_bid_px();
        let a = self.best_ask_px();
        if b == P::NO_BID || a == P::NO_ASK {
            return None;
        }
        // Widened so extreme 64-bit quotes cannot overflow the sum.
        #[allow(clippy::cast_possible_truncation)]
        let mid = ((i128::from(b.as_i64()) + i128::from(a.as_i64())) / 2) as i64;
        Some(P::from_i64(mid))
    }

    /// Ask minus bid in ticks, when both sides exist
    #[must_use]
    pub fn spread_ticks(&self) -> Option<i64> {
        let b = self.best_bid_px();
        let a = self.best_ask_px();
        if b == P::NO_BID || a == P::NO_ASK {
            return None;
        }
        Some(a.as_i64().saturating_sub(b.as_i64()))
    }

    /// Bid tape (read-only)
    #[must_use]
    pub fn bids(&self) -> &Tape<P, Q, N, W, true> {
        &self.bids
    }

    /// Ask tape (read-only)
    #[must_use]
    pub fn asks(&self) -> &Tape<P, Q, N, W, false> {
        &self.asks
    }

    /// Spill buffer (read-only)
    #[must_use]
    pub fn spill(&self) -> &SpillBuffer<P, Q> {
        &self.spill
    }

    /// Check every structural invariant on both sides: bitset coherence,
    /// cached best indices, anchor ranges, spill sortedness, no zero-qty
    /// spill entries, and tape-window/spill disjointness.
    #[must_use]
    pub fn verify_invariants(&self) -> bool {
        if !self.bids.verify_invariants() || !self.asks.verify_invariants() {
            return false;
        }
        for side in [&self.spill.bid, &self.spill.ask] {
            if !side.is_strictly_sorted() || side.has_zero_qty() {
                return false;
            }
        }
        let bid_lo = self.bids.anchor().as_i64();
        if self
            .spill
            .bid
            .levels()
            .iter()
            .any(|l| (0..N as i64).contains(&(l.px.as_i64() - bid_lo)))
        {
            return false;
        }
        let ask_lo = self.asks.anchor().as_i64();
        if self
            .spill
            .ask
            .levels()
            .iter()
            .any(|l| (0..N as i64).contains(&(l.px.as_i64() - ask_lo)))
        {
            return false;
        }
        true
    }
}
