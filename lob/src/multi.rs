//! Many books in one process: three width tiers behind one handle type
//!
//! Liquid instruments get wide tapes, quiet ones narrow tapes. Each tier is
//! an independently growable vector of books; a [`Handle`] names a book by
//! tier and slot, and [`MultiBook::with_book`] dispatches on the tier tag.
//! All books optionally share one [`LevelPool`] for their spill blocks.

use crate::book::Book;
use crate::pool::{LevelPool, PoolError};
use crate::tape::UpdateResult;
use common::{Price, Qty, Side, Symbol};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Tape-width tier of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookTier {
    /// Widest tape; the most active instruments
    High,
    /// Mid-width tape
    Medium,
    /// Narrowest tape; quiet instruments
    Low,
}

/// Stable key for a book in a [`MultiBook`]; valid for the container's life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    /// Which tier vector the book lives in
    pub tier: BookTier,
    /// Slot within that tier
    pub idx: u32,
}

/// Object-safe book surface used by [`MultiBook::with_book`] so one closure
/// can work on any tier's book type.
pub trait BookOps<P: Price, Q: Qty> {
    /// Clear both sides and re-anchor at `anchor`
    fn reset(&mut self, anchor: P);
    /// Reset one side so `mid_px` sits mid-window
    fn reset_at_mid(&mut self, side: Side, mid_px: P);
    /// Set, overwrite, or delete the level at `px`
    fn set(&mut self, side: Side, px: P, q: Q) -> UpdateResult;
    /// Erase levels at or better than `threshold` on one side
    fn erase_better(&mut self, side: Side, threshold: P);
    /// Force the bid tape onto a new anchor
    fn recenter_bid(&mut self, new_anchor: P);
    /// Force the ask tape onto a new anchor
    fn recenter_ask(&mut self, new_anchor: P);
    /// Best bid price or [`Price::NO_BID`]
    fn best_bid_px(&self) -> P;
    /// Best ask price or [`Price::NO_ASK`]
    fn best_ask_px(&self) -> P;
    /// Quantity at the best bid, or zero
    fn best_bid_qty(&self) -> Q;
    /// Quantity at the best ask, or zero
    fn best_ask_qty(&self) -> Q;
    /// Bid at or above ask, both present
    fn crossed(&self) -> bool;
    /// Tape-only crossedness
    fn crossed_on_tape(&self) -> bool;
    /// Structural invariant check
    fn verify_invariants(&self) -> bool;
    /// Tape width in ticks
    fn width(&self) -> usize;
}

impl<P: Price, Q: Qty, const N: usize, const W: usize> BookOps<P, Q> for Book<P, Q, N, W> {
    fn reset(&mut self, anchor: P) {
        Book::reset(self, anchor);
    }
    fn reset_at_mid(&mut self, side: Side, mid_px: P) {
        match side {
            Side::Bid => Book::reset_at_mid::<true>(self, mid_px),
            Side::Ask => Book::reset_at_mid::<false>(self, mid_px),
        }
    }
    fn set(&mut self, side: Side, px: P, q: Q) -> UpdateResult {
        Book::set(self, side, px, q)
    }
    fn erase_better(&mut self, side: Side, threshold: P) {
        Book::erase_better(self, side, threshold);
    }
    fn recenter_bid(&mut self, new_anchor: P) {
        Book::recenter_bid(self, new_anchor);
    }
    fn recenter_ask(&mut self, new_anchor: P) {
        Book::recenter_ask(self, new_anchor);
    }
    fn best_bid_px(&self) -> P {
        Book::best_bid_px(self)
    }
    fn best_ask_px(&self) -> P {
        Book::best_ask_px(self)
    }
    fn best_bid_qty(&self) -> Q {
        Book::best_bid_qty(self)
    }
    fn best_ask_qty(&self) -> Q {
        Book::best_ask_qty(self)
    }
    fn crossed(&self) -> bool {
        Book::crossed(self)
    }
    fn crossed_on_tape(&self) -> bool {
        Book::crossed_on_tape(self)
    }
    fn verify_invariants(&self) -> bool {
        Book::verify_invariants(self)
    }
    fn width(&self) -> usize {
        self.bids().width()
    }
}

/// Container of books in three width tiers, optionally sharing a pool.
///
/// Tier widths are const parameters with the usual 1024/256/64 defaults;
/// each `W` parameter must be its `N / 64`.
pub struct MultiBook<
    P: Price,
    Q: Qty,
    const NH: usize = 1024,
    const WH: usize = 16,
    const NM: usize = 256,
    const WM: usize = 4,
    const NL: usize = 64,
    const WL: usize = 1,
> {
    pool: Option<Rc<LevelPool<P, Q>>>,
    high: Vec<Book<P, Q, NH, WH>>,
    medium: Vec<Book<P, Q, NM, WM>>,
    low: Vec<Book<P, Q, NL, WL>>,
    by_symbol: FxHashMap<Symbol, Handle>,
    default_max_cap: usize,
}

impl<
    P: Price,
    Q: Qty,
    const NH: usize,
    const WH: usize,
    const NM: usize,
    const WM: usize,
    const NL: usize,
    const WL: usize,
> MultiBook<P, Q, NH, WH, NM, WM, NL, WL>
{
    /// Container whose books spill through the global allocator.
    #[must_use]
    pub fn new(default_max_cap: usize) -> Self {
        Self {
            pool: None,
            high: Vec::new(),
            medium: Vec::new(),
            low: Vec::new(),
            by_symbol: FxHashMap::default(),
            default_max_cap,
        }
    }

    /// Container with a shared pool of `pool_cap` level slots.
    ///
    /// # Errors
    ///
    /// Fails if the pool region cannot be created.
    pub fn with_pool(default_max_cap: usize, pool_cap: usize) -> Result<Self, PoolError> {
        let pool = Rc::new(LevelPool::new(pool_cap)?);
        Ok(Self {
            pool: Some(pool),
            high: Vec::new(),
            medium: Vec::new(),
            low: Vec::new(),
            by_symbol: FxHashMap::default(),
            default_max_cap,
        })
    }

    /// The shared pool, when one was configured
    #[must_use]
    pub fn pool(&self) -> Option<&Rc<LevelPool<P, Q>>> {
        self.pool.as_ref()
    }

    /// Pre-size the high tier
    pub fn reserve_high(&mut self, n: usize) {
        self.high.reserve(n);
    }

    /// Pre-size the medium tier
    pub fn reserve_medium(&mut self, n: usize) {
        self.medium.reserve(n);
    }

    /// Pre-size the low tier
    pub fn reserve_low(&mut self, n: usize) {
        self.low.reserve(n);
    }

    /// Allocate a book in `tier`, reset to `anchor`, with the default
    /// spill capacity.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is invalid for the tier's width or more than
    /// `u32::MAX` books live in one tier.
    pub fn alloc(&mut self, tier: BookTier, anchor: P) -> Handle {
        self.alloc_with_cap(tier, anchor, None)
    }

    /// [`MultiBook::alloc`] with an explicit per-side spill capacity.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` or the capacity is invalid, or a tier overflows.
    pub fn alloc_with_cap(&mut self, tier: BookTier, anchor: P, max_cap: Option<usize>) -> Handle {
        let cap = max_cap.unwrap_or(self.default_max_cap);
        let pool = self.pool.clone();
        let idx = match tier {
            BookTier::High => {
                let idx = u32::try_from(self.high.len()).expect("tier full");
                let mut b = Book::with_pool(cap, pool);
                b.reset(anchor);
                self.high.push(b);
                idx
            }
            BookTier::Medium => {
                let idx = u32::try_from(self.medium.len()).expect("tier full");
                let mut b = Book::with_pool(cap, pool);
                b.reset(anchor);
                self.medium.push(b);
                idx
            }
            BookTier::Low => {
                let idx = u32::try_from(self.low.len()).expect("tier full");
                let mut b = Book::with_pool(cap, pool);
                b.reset(anchor);
                self.low.push(b);
                idx
            }
        };
        Handle { tier, idx }
    }

    /// Allocate a book and register it under `symbol`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`MultiBook::alloc`].
    pub fn alloc_for(&mut self, symbol: Symbol, tier: BookTier, anchor: P) -> Handle {
        let h = self.alloc(tier, anchor);
        self.by_symbol.insert(symbol, h);
        h
    }

    /// Handle previously registered for `symbol`
    #[must_use]
    pub fn handle_of(&self, symbol: Symbol) -> Option<Handle> {
        self.by_symbol.get(&symbol).copied()
    }

    /// Run `f` against the book `h` names, whatever its tier.
    pub fn with_book<R>(&mut self, h: Handle, f: impl FnOnce(&mut dyn BookOps<P, Q>) -> R) -> R {
        match h.tier {
            BookTier::High => f(&mut self.high[h.idx as usize]),
            BookTier::Medium => f(&mut self.medium[h.idx as usize]),
            BookTier::Low => f(&mut self.low[h.idx as usize]),
        }
    }

    /// Read-only counterpart of [`MultiBook::with_book`].
    pub fn with_book_ref<R>(&self, h: Handle, f: impl FnOnce(&dyn BookOps<P, Q>) -> R) -> R {
        match h.tier {
            BookTier::High => f(&self.high[h.idx as usize]),
            BookTier::Medium => f(&self.medium[h.idx as usize]),
            BookTier::Low => f(&self.low[h.idx as usize]),
        }
    }

    /// High-tier book at `idx`
    #[must_use]
    pub fn high(&self, idx: u32) -> &Book<P, Q, NH, WH> {
        &self.high[idx as usize]
    }

    /// High-tier book at `idx`, mutably
    pub fn high_mut(&mut self, idx: u32) -> &mut Book<P, Q, NH, WH> {
        &mut self.high[idx as usize]
    }

    /// Medium-tier book at `idx`
    #[must_use]
    pub fn medium(&self, idx: u32) -> &Book<P, Q, NM, WM> {
        &self.medium[idx as usize]
    }

    /// Medium-tier book at `idx`, mutably
    pub fn medium_mut(&mut self, idx: u32) -> &mut Book<P, Q, NM, WM> {
        &mut self.medium[idx as usize]
    }

    /// Low-tier book at `idx`
    #[must_use]
    pub fn low(&self, idx: u32) -> &Book<P, Q, NL, WL> {
        &self.low[idx as usize]
    }

    /// Low-tier book at `idx`, mutably
    pub fn low_mut(&mut self, idx: u32) -> &mut Book<P, Q, NL, WL> {
        &mut self.low[idx as usize]
    }

    /// Books per tier: `(high, medium, low)`
    #[must_use]
    pub fn tier_lens(&self) -> (usize, usize, usize) {
        (self.high.len(), self.medium.len(), self.low.len())
    }
}
