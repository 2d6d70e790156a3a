//! Fill of a resting order by a taker.
//!
//! ## Terminology
//!
//! - **Maker**: the resting limit order
//! - **Taker**: the swap walking the book
//!
//! `bought` is the gross amount of the taker's input coin the maker
//! receives, `sold` the gross amount of the maker's escrow handed to the
//! taker. Each leg carries its own commission, which returns to the pool.

use num_bigint::BigUint;

use crate::amm::fee::fee_from_gross;
use crate::types::coin::Address;

/// One matched order inside a swap.
///
/// ## Example
///
/// ```
/// use hybrid_swap::types::{Address, OrderFill};
/// use num_bigint::BigUint;
///
/// let fill = OrderFill::new(7, Address::default(), BigUint::from(3003u32), BigUint::from(1001u32));
/// assert_eq!(fill.maker_payout(), BigUint::from(3000u32));
/// assert_eq!(fill.taker_proceeds(), BigUint::from(1000u32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    /// Matched order
    pub order_id: u32,

    /// Maker receiving the taker's coin
    pub owner: Address,

    /// Gross amount of the taker's input coin paid to the order
    pub bought: BigUint,

    /// Gross amount of the order's escrow delivered to the taker
    pub sold: BigUint,
}

impl OrderFill {
    /// Create a new fill
    pub fn new(order_id: u32, owner: Address, bought: BigUint, sold: BigUint) -> Self {
        Self {
            order_id,
            owner,
            bought,
            sold,
        }
    }

    /// Commission withheld from the maker's proceeds
    pub fn maker_commission(&self) -> BigUint {
        fee_from_gross(&self.bought)
    }

    /// Commission withheld from the taker's proceeds
    pub fn taker_commission(&self) -> BigUint {
        fee_from_gross(&self.sold)
    }

    /// Amount credited to the maker
    pub fn maker_payout(&self) -> BigUint {
        &self.bought - self.maker_commission()
    }

    /// Amount the taker receives from this order
    pub fn taker_proceeds(&self) -> BigUint {
        &self.sold - self.taker_commission()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
