//! Constant-product curve with a per-mille fee.
//!
//! ## Architecture
//!
//! [`Curve`] is an immutable value: reserves seen from one trading direction
//! (`reserve_in` of the coin the taker sells, `reserve_out` of the coin it
//! receives). Every hypothetical step returns a new curve, so probing price
//! moves during matching can never leak into persisted reserves.
//!
//! ## Formulas
//!
//! With `f` = [`POOL_FEE_PER_MILLE`]:
//!
//! ```text
//! amount_out = r_out - floor(r_in*r_out*10^6 / (((a+r_in)*1000 - a*f) * 1000)) - 1
//! amount_in  = floor((floor(r_in*r_out*10^6 / ((r_out-o)*1000)) - r_in*1000) / (1000-f)) + 1
//! ```
//!
//! The trailing `-1` / `+1` round toward the pool.

use std::cmp::Ordering;

use num_bigint::BigUint;
use num_traits::Zero;

use crate::amm::fee::POOL_FEE_PER_MILLE;
use crate::error::SwapError;
use crate::types::price::Price;

/// Scale of the fee-adjusted product check: 1000 * 1000
const K_SCALE: u32 = 1_000_000;

/// Fee-adjusted constant-product curve seen from one direction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Curve {
    reserve_in: BigUint,
    reserve_out: BigUint,
}

impl Curve {
    /// Create a curve from directional reserves
    pub fn new(reserve_in: BigUint, reserve_out: BigUint) -> Self {
        Self {
            reserve_in,
            reserve_out,
        }
    }

    /// Reserve of the coin the taker sells
    #[inline]
    pub fn reserve_in(&self) -> &BigUint {
        &self.reserve_in
    }

    /// Reserve of the coin the taker receives
    #[inline]
    pub fn reserve_out(&self) -> &BigUint {
        &self.reserve_out
    }

    /// The same curve traded in the opposite direction
    pub fn reversed(&self) -> Self {
        Self::new(self.reserve_out.clone(), self.reserve_in.clone())
    }

    /// True when either reserve is empty
    pub fn is_empty(&self) -> bool {
        self.reserve_in.is_zero() || self.reserve_out.is_zero()
    }

    /// Marginal output per unit of input: `reserve_out / reserve_in`
    pub fn price(&self) -> Price {
        Price::from_ratio(&self.reserve_out, &self.reserve_in)
    }

    /// Marginal input per unit of output: `reserve_in / reserve_out`.
    ///
    /// The inverse of [`Curve::price`], in the same unit as the sort price
    /// of the orders a taker of this direction consumes.
    pub fn sort_price(&self) -> Price {
        Price::from_ratio(&self.reserve_in, &self.reserve_out)
    }

    /// Exact comparison of `numerator / denominator` against the curve price
    pub fn cmp_price(&self, numerator: &BigUint, denominator: &BigUint) -> Ordering {
        (numerator * &self.reserve_in).cmp(&(&self.reserve_out * denominator))
    }

    // ========================================================================
    // Swap amounts
    // ========================================================================

    /// Output received for selling `amount_in` into the curve.
    ///
    /// # Returns
    ///
    /// * `None` - If the curve is empty or the result is not positive
    pub fn amount_out(&self, amount_in: &BigUint) -> Option<BigUint> {
        if self.is_empty() || amount_in.is_zero() {
            return None;
        }
        let k = &self.reserve_in * &self.reserve_out * K_SCALE;
        let balance_in = (amount_in + &self.reserve_in) * 1000u32 - amount_in * POOL_FEE_PER_MILLE;
        let rest = k / (balance_in * 1000u32) + 1u32;
        if rest >= self.reserve_out {
            return None;
        }
        Some(&self.reserve_out - rest)
    }

    /// Input required to receive exactly `amount_out` from the curve.
    ///
    /// # Returns
    ///
    /// * `None` - If the curve is empty, `amount_out` is zero, or
    ///   `amount_out` would drain the output reserve
    pub fn amount_in(&self, amount_out: &BigUint) -> Option<BigUint> {
        if self.is_empty() || amount_out.is_zero() || *amount_out >= self.reserve_out {
            return None;
        }
        let k = &self.reserve_in * &self.reserve_out * K_SCALE;
        let balance_out = (&self.reserve_out - amount_out) * 1000u32;
        let scaled = k / balance_out;
        let base = &self.reserve_in * 1000u32;
        // scaled >= base because balance_out < reserve_out * 1000
        let numerator = scaled - base;
        Some(numerator / (1000 - POOL_FEE_PER_MILLE) + 1u32)
    }

    /// Validate a curve trade against the fee-adjusted product invariant.
    ///
    /// # Errors
    ///
    /// * [`SwapError::InsufficientLiquidity`] - `amount_out` exceeds the reserve
    /// * [`SwapError::InsufficientOutputAmount`] - `amount_out` is zero
    /// * [`SwapError::InsufficientInputAmount`] - `amount_in` is zero
    /// * [`SwapError::K`] - the trade would shrink the fee-adjusted product
    pub fn check_swap(&self, amount_in: &BigUint, amount_out: &BigUint) -> Result<(), SwapError> {
        if *amount_out > self.reserve_out {
            return Err(SwapError::InsufficientLiquidity {
                wanted: amount_out.clone(),
                available: self.reserve_out.clone(),
            });
        }
        if amount_out.is_zero() {
            return Err(SwapError::InsufficientOutputAmount);
        }
        if amount_in.is_zero() {
            return Err(SwapError::InsufficientInputAmount);
        }
        let balance_in = (&self.reserve_in + amount_in) * 1000u32 - amount_in * POOL_FEE_PER_MILLE;
        let balance_out = (&self.reserve_out - amount_out) * 1000u32;
        if balance_in * balance_out < &self.reserve_in * &self.reserve_out * K_SCALE {
            return Err(SwapError::K);
        }
        Ok(())
    }

    // ========================================================================
    // Hypothetical steps
    // ========================================================================

    /// Curve after a trade of `amount_in` for `amount_out`.
    ///
    /// # Panics
    ///
    /// Panics if `amount_out` exceeds the output reserve.
    pub fn after_swap(&self, amount_in: &BigUint, amount_out: &BigUint) -> Self {
        assert!(
            *amount_out <= self.reserve_out,
            "step out {} exceeds reserve {}",
            amount_out,
            self.reserve_out
        );
        Self::new(&self.reserve_in + amount_in, &self.reserve_out - amount_out)
    }

    /// Curve after commissions were added to both reserves
    pub fn after_deposit(&self, amount_in: &BigUint, amount_out: &BigUint) -> Self {
        Self::new(&self.reserve_in + amount_in, &self.reserve_out + amount_out)
    }

    /// Input that moves the curve price down to `numerator / denominator`.
    ///
    /// Solves `(r_in + 0.998x)(r_in + x) = r_in * r_out * denominator / numerator`
    /// for the largest integer `x` that does not overshoot the target.
    ///
    /// # Returns
    ///
    /// * `None` - If the target is not below the current price or no whole
    ///   unit of input reaches it
    pub fn amount_in_for_price(&self, numerator: &BigUint, denominator: &BigUint) -> Option<BigUint> {
        if self.is_empty() || numerator.is_zero() || denominator.is_zero() {
            return None;
        }
        if self.cmp_price(numerator, denominator) != Ordering::Less {
            return None;
        }

        let fee_keep = 1000 - POOL_FEE_PER_MILLE;
        let r0 = &self.reserve_in;
        // a*x^2 + b*x - c = 0
        let a = numerator * fee_keep;
        let b = numerator * r0 * (2000 - POOL_FEE_PER_MILLE);
        let c = (denominator * r0 * &self.reserve_out - numerator * r0 * r0) * 1000u32;
        let discriminant = &b * &b + &a * &c * 4u32;
        let root = discriminant.sqrt();
        if root <= b {
            return None;
        }
        let x = (root - b) / (a * 2u32);
        if x.is_zero() {
            None
        } else {
            Some(x)
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
