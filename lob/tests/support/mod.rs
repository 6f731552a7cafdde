//! Shared test helpers: an ordered-map reference book and level collectors

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use common::{Qty, Side};
use lob::{Book, NullSink};
use std::collections::BTreeMap;

/// Reference model: each side is an ordered map from price to non-zero qty.
#[derive(Debug, Default)]
pub struct RefBook {
    pub bid: BTreeMap<i32, u32>,
    pub ask: BTreeMap<i32, u32>,
}

impl RefBook {
    pub fn set(&mut self, side: Side, px: i32, q: u32) {
        let m = match side {
            Side::Bid => &mut self.bid,
            Side::Ask => &mut self.ask,
        };
        if q == 0 {
            m.remove(&px);
        } else {
            m.insert(px, q);
        }
    }

    pub fn erase_better(&mut self, side: Side, threshold: i32) {
        match side {
            Side::Bid => self.bid.retain(|&px, _| px < threshold),
            Side::Ask => self.ask.retain(|&px, _| px > threshold),
        }
    }

    pub fn best_bid_px(&self) -> i32 {
        self.bid.last_key_value().map_or(i32::MIN, |(&px, _)| px)
    }

    pub fn best_ask_px(&self) -> i32 {
        self.ask.first_key_value().map_or(i32::MAX, |(&px, _)| px)
    }

    pub fn best_bid_qty(&self) -> u32 {
        self.bid.last_key_value().map_or(0, |(_, &q)| q)
    }

    pub fn best_ask_qty(&self) -> u32 {
        self.ask.first_key_value().map_or(0, |(_, &q)| q)
    }

    pub fn crossed(&self) -> bool {
        let (b, a) = (self.best_bid_px(), self.best_ask_px());
        b != i32::MIN && a != i32::MAX && b >= a
    }
}

/// Collect one side's levels, walking tape and spill separately.
pub fn collect_side<Q2, const N: usize, const W: usize>(
    book: &Book<i32, Q2, N, W>,
    side: Side,
) -> BTreeMap<i32, Q2>
where
    Q2: Qty,
{
    let mut out = BTreeMap::new();
    let mut add = |px: i32, q: Q2| {
        if !q.is_zero() {
            out.insert(px, q);
        }
        true
    };
    match side {
        Side::Bid => {
            book.bids().iterate_from_best(&mut add, &NullSink);
            book.spill().bid.iterate::<true, _>(&mut add);
        }
        Side::Ask => {
            book.asks().iterate_from_best(&mut add, &NullSink);
            book.spill().ask.iterate::<false, _>(&mut add);
        }
    }
    out
}

/// Collect one side through the chained tape-then-spill iteration,
/// also returning the raw visit order.
pub fn collect_chained<Q2, const N: usize, const W: usize>(
    book: &Book<i32, Q2, N, W>,
    side: Side,
) -> (Vec<(i32, Q2)>, BTreeMap<i32, Q2>)
where
    Q2: Qty,
{
    let mut ordered = Vec::new();
    let mut out = BTreeMap::new();
    let mut add = |px: i32, q: Q2| {
        if !q.is_zero() {
            ordered.push((px, q));
            out.insert(px, q);
        }
        true
    };
    match side {
        Side::Bid => book.bids().iterate_from_best(&mut add, book.spill()),
        Side::Ask => book.asks().iterate_from_best(&mut add, book.spill()),
    }
    (ordered, out)
}

/// Compare every observable of `book` against `reference`; panics with
/// context on the first mismatch.
pub fn assert_matches_reference<const N: usize, const W: usize>(
    book: &Book<i32, u32, N, W>,
    reference: &RefBook,
    context: &str,
) {
    assert_eq!(book.best_bid_px(), reference.best_bid_px(), "best_bid_px {context}");
    assert_eq!(book.best_ask_px(), reference.best_ask_px(), "best_ask_px {context}");
    assert_eq!(book.best_bid_qty(), reference.best_bid_qty(), "best_bid_qty {context}");
    assert_eq!(book.best_ask_qty(), reference.best_ask_qty(), "best_ask_qty {context}");
    assert_eq!(book.crossed(), reference.crossed(), "crossed {context}");
    if book.crossed_on_tape() {
        assert!(book.crossed(), "crossed_on_tape without crossed {context}");
    }
    assert!(book.verify_invariants(), "verify_invariants {context}");
}

/// Deep comparison: full level sets through both iteration paths.
pub fn assert_levels_match<const N: usize, const W: usize>(
    book: &Book<i32, u32, N, W>,
    reference: &RefBook,
    context: &str,
) {
    for side in [Side::Bid, Side::Ask] {
        let expect = match side {
            Side::Bid => &reference.bid,
            Side::Ask => &reference.ask,
        };
        let separate = collect_side(book, side);
        assert_eq!(&separate, expect, "levels (separate) {side} {context}");

        let (ordered, chained) = collect_chained(book, side);
        assert_eq!(&chained, expect, "levels (chained) {side} {context}");
        assert_eq!(
            ordered.len(),
            chained.len(),
            "duplicate price in chained iteration {side} {context}"
        );
    }
}
