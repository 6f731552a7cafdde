//! Core types for the tape book

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol identifier for trading instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub u32);

impl Symbol {
    /// Create a new Symbol with given ID
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYM_{}", self.0)
    }
}

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side; higher price is better
    Bid,
    /// Sell side; lower price is better
    Ask,
}

impl Side {
    /// `true` for [`Side::Bid`]
    #[must_use]
    pub const fn is_bid(self) -> bool {
        matches!(self, Self::Bid)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "BID"),
            Self::Ask => write!(f, "ASK"),
        }
    }
}

/// Signed integer price in ticks.
///
/// `NO_BID` (the type's minimum) is the "no bid" sentinel and `NO_ASK`
/// (the maximum) the "no ask" sentinel; neither is a usable level price.
pub trait Price: Copy + Eq + Ord + fmt::Debug + fmt::Display + Send + 'static {
    /// Lowest representable price; returned by best-bid queries on an empty side
    const NO_BID: Self;
    /// Highest representable price; returned by best-ask queries on an empty side
    const NO_ASK: Self;

    /// Widen to `i64` for index arithmetic
    fn as_i64(self) -> i64;

    /// Narrow from `i64`; the caller guarantees the value is representable
    fn from_i64(v: i64) -> Self;
}

/// Unsigned integer quantity in units; zero means "level absent".
pub trait Qty: Copy + Eq + fmt::Debug + fmt::Display + Send + 'static {
    /// The absent-level quantity
    const ZERO: Self;

    /// `true` iff this is [`Qty::ZERO`]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

macro_rules! impl_price {
    ($($t:ty),*) => {$(
        impl Price for $t {
            const NO_BID: Self = <$t>::MIN;
            const NO_ASK: Self = <$t>::MAX;

            #[inline(always)]
            fn as_i64(self) -> i64 {
                i64::from(self)
            }

            #[inline(always)]
            #[allow(clippy::cast_possible_truncation)]
            fn from_i64(v: i64) -> Self {
                debug_assert!(
                    i64::from(<$t>::MIN) <= v && v <= i64::from(<$t>::MAX),
                    "price {v} not representable"
                );
                v as $t
            }
        }
    )*};
}

impl_price!(i16, i32, i64);

macro_rules! impl_qty {
    ($($t:ty),*) => {$(
        impl Qty for $t {
            const ZERO: Self = 0;
        }
    )*};
}

impl_qty!(u16, u32, u64);

/// One price level: price in ticks, resting quantity in units
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level<P, Q> {
    /// Level price
    pub px: P,
    /// Resting quantity
    pub qty: Q,
}

impl<P, Q> Level<P, Q> {
    /// Create a level
    #[inline]
    pub const fn new(px: P, qty: Q) -> Self {
        Self { px, qty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_serde() -> Result<(), Box<dyn std::error::Error>> {
        let sym = Symbol::new(42);
        let encoded = bincode::serialize(&sym)?;
        let decoded: Symbol = bincode::deserialize(&encoded)?;
        assert_eq!(sym, decoded);
        Ok(())
    }

    #[test]
    fn test_side_serde() -> Result<(), Box<dyn std::error::Error>> {
        for side in [Side::Bid, Side::Ask] {
            let encoded = bincode::serialize(&side)?;
            let decoded: Side = bincode::deserialize(&encoded)?;
            assert_eq!(side, decoded);
        }
        Ok(())
    }

    #[test]
    fn test_level_serde() -> Result<(), Box<dyn std::error::Error>> {
        let lv = Level::new(10_050_i32, 250_u32);
        let encoded = bincode::serialize(&lv)?;
        let decoded: Level<i32, u32> = bincode::deserialize(&encoded)?;
        assert_eq!(lv, decoded);
        Ok(())
    }

    #[test]
    fn test_price_sentinels() {
        assert_eq!(<i32 as Price>::NO_BID, i32::MIN);
        assert_eq!(<i32 as Price>::NO_ASK, i32::MAX);
        assert_eq!(<i16 as Price>::NO_BID, i16::MIN);
        assert_eq!(<i64 as Price>::NO_ASK, i64::MAX);
    }

    #[test]
    fn test_price_widening_round_trip() {
        for px in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(<i32 as Price>::from_i64(px.as_i64()), px);
        }
    }

    #[test]
    fn test_qty_zero() {
        assert!(0_u32.is_zero());
        assert!(!1_u32.is_zero());
        assert_eq!(<u64 as Qty>::ZERO, 0);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Bid.to_string(), "BID");
        assert_eq!(Side::Ask.to_string(), "ASK");
        assert!(Side::Bid.is_bid());
        assert!(!Side::Ask.is_bid());
    }
}
