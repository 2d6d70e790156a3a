//! Pool and order commissions.
//!
//! ## Pool Fee
//!
//! Curve trades pay [`POOL_FEE_PER_MILLE`] through the constant-product
//! formula in [`crate::amm::Curve`].
//!
//! ## Order Commission
//!
//! Each leg of an order fill pays `ORDER_FEE_PER_MILLE / 2` per mille back
//! into the pool reserves. Both helpers round up, so the taker and maker
//! never underpay.
//!
//! | Helper | Input | Result |
//! |--------|-------|--------|
//! | [`fee_on_net`] | net amount | fee added on top |
//! | [`fee_from_gross`] | gross amount | fee contained in it |

use num_bigint::BigUint;

use crate::types::amount::ceil_div;

/// Curve trading fee, per mille
pub const POOL_FEE_PER_MILLE: u32 = 2;

/// Order commission across both legs of a fill, per mille
pub const ORDER_FEE_PER_MILLE: u32 = 2;

/// Commission charged on a single leg, per mille
const LEG_FEE_PER_MILLE: u32 = ORDER_FEE_PER_MILLE / 2;

/// Fee to add on top of a net amount: `ceil(amount * 1 / 1000)`
///
/// # Example
///
/// ```
/// use hybrid_swap::amm::fee::fee_on_net;
/// use num_bigint::BigUint;
///
/// assert_eq!(fee_on_net(&BigUint::from(1000u32)), BigUint::from(1u32));
/// assert_eq!(fee_on_net(&BigUint::from(1001u32)), BigUint::from(2u32));
/// ```
pub fn fee_on_net(amount: &BigUint) -> BigUint {
    ceil_div(&(amount * LEG_FEE_PER_MILLE), &BigUint::from(1000u32))
}

/// Fee contained in a gross amount: `ceil(amount / 1001)`
///
/// # Example
///
/// ```
/// use hybrid_swap::amm::fee::fee_from_gross;
/// use num_bigint::BigUint;
///
/// assert_eq!(fee_from_gross(&BigUint::from(1001u32)), BigUint::from(1u32));
/// assert_eq!(fee_from_gross(&BigUint::from(1002u32)), BigUint::from(2u32));
/// ```
pub fn fee_from_gross(amount: &BigUint) -> BigUint {
    ceil_div(amount, &BigUint::from(1000 + LEG_FEE_PER_MILLE))
}

/// Gross amount minus the commission it contains
pub fn net_of_fee(gross: &BigUint) -> BigUint {
    gross - fee_from_gross(gross)
}

// ============================================================================
// Unit Tests
// ============================================================================
