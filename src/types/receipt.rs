//! Swap receipts.
//!
//! A [`SwapReceipt`] summarizes an executed swap: what the taker paid and
//! received, how much of it the curve absorbed, and what every matched order
//! earned. The transaction layer applies the taker's own debit and credit
//! from it and emits trade events; maker payouts and refunds listed here have
//! already been credited through the ledger.

use num_bigint::{BigInt, BigUint};

use crate::types::coin::{Address, CoinId, PairKey};
use crate::types::fill::OrderFill;

/// Proceeds credited to an order's owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakerPayout {
    pub order_id: u32,
    pub owner: Address,
    pub coin: CoinId,
    pub amount: BigUint,
}

/// Escrow returned to an order's owner when the order is retired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRefund {
    pub order_id: u32,
    pub owner: Address,
    pub coin: CoinId,
    pub amount: BigUint,
}

/// Net effect of a swap on the pool, in the swap's direction.
///
/// `pool_in`/`pool_out` are the curve-traded parts of the swap; they are
/// signed because order-leg rounding may leave the curve a unit on either
/// side. Commissions are added to the reserves on top.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolDelta {
    pub pool_in: BigInt,
    pub pool_out: BigInt,
    pub commission_in: BigUint,
    pub commission_out: BigUint,
}

/// Result of an executed swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    /// Account that submitted the swap
    pub trader: Address,

    /// Trading direction: `coin0` sold by the taker, `coin1` received
    pub direction: PairKey,

    /// Pool id of the pair
    pub pool_id: u32,

    /// Gross amount the taker pays
    pub amount_in: BigUint,

    /// Amount the taker receives
    pub amount_out: BigUint,

    /// Pool share of the trade
    pub pool: PoolDelta,

    /// Matched orders, best price first
    pub fills: Vec<OrderFill>,

    /// Maker proceeds credited during execution
    pub payouts: Vec<MakerPayout>,

    /// Escrow returned for orders retired with dust left on one side
    pub refunds: Vec<OrderRefund>,
}

impl SwapReceipt {
    /// True when no order was touched
    pub fn is_curve_only(&self) -> bool {
        self.fills.is_empty()
    }

    /// Sum of all maker payouts
    pub fn total_payout(&self) -> BigUint {
        self.payouts.iter().map(|p| &p.amount).sum()
    }
}
