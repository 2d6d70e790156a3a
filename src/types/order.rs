//! Limit orders resting on a pair.
//!
//! ## Orientation
//!
//! An order always sells one coin of its pair and buys the other. Its
//! [`Side`] is relative to the pair's canonical orientation:
//!
//! - [`Side::Sell`]: sells the canonical `coin1`, buys `coin0` (a "sale").
//! - [`Side::Buy`]: sells the canonical `coin0`, buys `coin1`.
//!
//! Amounts are stored in the order's own terms: `want_buy` of the coin it
//! buys, `want_sell` of the coin it sells. A taker selling coin X for coin Y
//! consumes the orders that sell Y, paying each order in X.
//!
//! ## Sort Price
//!
//! Within a side, orders are ranked by `want_buy / want_sell` ascending: the
//! smaller the ratio, the more the order gives per unit it receives. Ties
//! break by ascending id.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::types::coin::{Address, CoinId, PairKey};
use crate::types::price::Price;

// ============================================================================
// Side enum
// ============================================================================

/// Book side of an order relative to the canonical pair orientation.
///
/// Represented as u8 in persisted records:
/// - Buy = 0
/// - Sell = 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Side {
    /// Sells canonical coin0, buys coin1
    #[default]
    Buy,
    /// Sells canonical coin1, buys coin0
    Sell,
}

impl Side {
    /// Convert to u8 for serialization
    pub fn to_u8(self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    /// Convert from u8 for deserialization
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    /// Returns the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side of the orders that sell a view's `coin1`.
    ///
    /// For a view in canonical orientation that is the sale side; for a
    /// reversed view it is the buy side. The same side is both where an
    /// order placed through the view rests and what a taker selling the
    /// view's `coin0` consumes.
    #[inline]
    pub fn selling_view_coin1(view_sorted: bool) -> Self {
        if view_sorted {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    /// Export flag: true for orders selling canonical coin1
    #[inline]
    pub fn is_sale(self) -> bool {
        self == Side::Sell
    }
}

// ============================================================================
// LimitOrder
// ============================================================================

/// A limit order resting on a pair.
///
/// ## Example
///
/// ```
/// use hybrid_swap::types::{Address, LimitOrder, PairKey, Side};
/// use num_bigint::BigUint;
///
/// // Sell 5000 of coin 2 for 15000 of coin 1
/// let order = LimitOrder::new(
///     1,
///     PairKey::new(1, 2),
///     Side::Sell,
///     Address::default(),
///     BigUint::from(15_000u32),
///     BigUint::from(5_000u32),
///     100,
/// );
/// assert_eq!(order.coin_sell().value(), 2);
/// assert_eq!(order.canonical_volumes().0, BigUint::from(15_000u32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrder {
    /// Globally unique order id (monotonic across all pairs)
    pub id: u32,

    /// Canonical pair the order rests on
    pub pair: PairKey,

    /// Book side relative to `pair`
    pub side: Side,

    /// Account that placed the order and receives its proceeds
    pub owner: Address,

    /// Remaining amount of the bought coin
    pub want_buy: BigUint,

    /// Remaining amount of the sold coin (held in escrow)
    pub want_sell: BigUint,

    /// Block height the order was placed at
    pub height: u64,

    /// Sort price of the order's persisted index entry, if any
    stored_price: Option<Price>,
}

impl LimitOrder {
    /// Create a new, not yet persisted order
    ///
    /// # Arguments
    ///
    /// * `id` - Global order id
    /// * `pair` - Canonical pair key
    /// * `side` - Side relative to `pair`
    /// * `owner` - Maker address
    /// * `want_buy` - Amount of the bought coin
    /// * `want_sell` - Amount of the sold coin
    /// * `height` - Creation height
    pub fn new(
        id: u32,
        pair: PairKey,
        side: Side,
        owner: Address,
        want_buy: BigUint,
        want_sell: BigUint,
        height: u64,
    ) -> Self {
        debug_assert!(pair.is_sorted(), "orders are keyed by the canonical pair");
        Self {
            id,
            pair,
            side,
            owner,
            want_buy,
            want_sell,
            height,
            stored_price: None,
        }
    }

    /// Rebuild an order read back from its persisted record
    pub(crate) fn from_store(mut order: LimitOrder) -> Self {
        order.stored_price = Some(order.sort_price());
        order
    }

    /// Coin the order sells
    pub fn coin_sell(&self) -> CoinId {
        match self.side {
            Side::Sell => self.pair.coin1,
            Side::Buy => self.pair.coin0,
        }
    }

    /// Coin the order buys
    pub fn coin_buy(&self) -> CoinId {
        match self.side {
            Side::Sell => self.pair.coin0,
            Side::Buy => self.pair.coin1,
        }
    }

    /// `(coin0 amount, coin1 amount)` in canonical orientation
    pub fn canonical_volumes(&self) -> (BigUint, BigUint) {
        match self.side {
            Side::Sell => (self.want_buy.clone(), self.want_sell.clone()),
            Side::Buy => (self.want_sell.clone(), self.want_buy.clone()),
        }
    }

    /// Book ranking price: `want_buy / want_sell`, lower is better for takers
    #[inline]
    pub fn sort_price(&self) -> Price {
        Price::from_ratio(&self.want_buy, &self.want_sell)
    }

    /// Sort price recorded for the persisted index entry
    #[inline]
    pub fn stored_price(&self) -> Option<Price> {
        self.stored_price
    }

    /// True when the persisted index entry is still at the right position
    pub fn is_keep_rate(&self) -> bool {
        self.stored_price == Some(self.sort_price())
    }

    /// Record that the index entry now sits at the current sort price
    pub(crate) fn mark_stored(&mut self) {
        self.stored_price = Some(self.sort_price());
    }

    /// An order with either side at zero is fully consumed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.want_buy.is_zero() || self.want_sell.is_zero()
    }

    /// Reduce the remaining amounts after a fill.
    ///
    /// # Panics
    ///
    /// Panics if the fill exceeds the remaining amounts.
    pub(crate) fn reduce(&mut self, bought: &BigUint, sold: &BigUint) {
        assert!(
            *bought <= self.want_buy && *sold <= self.want_sell,
            "fill ({}, {}) exceeds order {} remaining ({}, {})",
            bought,
            sold,
            self.id,
            self.want_buy,
            self.want_sell
        );
        self.want_buy -= bought;
        self.want_sell -= sold;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order(side: Side, want_buy: u64, want_sell: u64) -> LimitOrder {
        LimitOrder::new(
            1,
            PairKey::new(1, 2),
            side,
            Address::default(),
            BigUint::from(want_buy),
            BigUint::from(want_sell),
            10,
        )
    }

    #[test]
    fn test_side_conversion() {
        assert_eq!(Side::Buy.to_u8(), 0);
        assert_eq!(Side::Sell.to_u8(), 1);
        assert_eq!(Side::from_u8(0), Some(Side::Buy));
        assert_eq!(Side::from_u8(1), Some(Side::Sell));
        assert_eq!(Side::from_u8(2), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_side_for_view() {
        assert_eq!(Side::selling_view_coin1(true), Side::Sell);
        assert_eq!(Side::selling_view_coin1(false), Side::Buy);
        assert!(Side::Sell.is_sale());
    }

    #[test]
    fn test_coins_by_side() {
        let sale = order(Side::Sell, 10, 5);
        assert_eq!(sale.coin_sell(), CoinId(2));
        assert_eq!(sale.coin_buy(), CoinId(1));

        let buy = order(Side::Buy, 10, 5);
        assert_eq!(buy.coin_sell(), CoinId(1));
        assert_eq!(buy.coin_buy(), CoinId(2));
        assert_eq!(buy.canonical_volumes(), (BigUint::from(5u32), BigUint::from(10u32)));
    }

    #[test]
    fn test_keep_rate_tracking() {
        let mut o = order(Side::Sell, 300, 100);
        assert!(!o.is_keep_rate());
        o.mark_stored();
        assert!(o.is_keep_rate());

        // Proportional fill keeps the rate
        o.reduce(&BigUint::from(30u32), &BigUint::from(10u32));
        assert!(o.is_keep_rate());

        // Rounded fill moves it
        o.reduce(&BigUint::from(30u32), &BigUint::from(9u32));
        assert!(!o.is_keep_rate());
    }

    #[test]
    fn test_empty_when_either_side_zero() {
        let mut o = order(Side::Buy, 10, 5);
        assert!(!o.is_empty());
        o.reduce(&BigUint::from(10u32), &BigUint::from(4u32));
        assert!(o.is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds order")]
    fn test_overfill_panics() {
        let mut o = order(Side::Buy, 10, 5);
        o.reduce(&BigUint::from(11u32), &BigUint::from(1u32));
    }
}
