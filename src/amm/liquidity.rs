//! Liquidity issuance and withdrawal math.
//!
//! All quantities are canonical: `amount0`/`reserve0` refer to the pair's
//! first coin. The liquidity token itself is minted and burned by the caller.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::SwapError;

/// Result of a proportional liquidity add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintQuote {
    /// Coin0 contributed
    pub amount0: BigUint,
    /// Coin1 required to keep the ratio
    pub amount1: BigUint,
    /// Liquidity issued
    pub liquidity: BigUint,
}

/// Initial liquidity for a new pool: `isqrt(amount0 * amount1)`.
///
/// # Errors
///
/// * [`SwapError::InsufficientLiquidityMinted`] - if the result does not
///   exceed `minimum`
pub fn initial_liquidity(amount0: &BigUint, amount1: &BigUint, minimum: &BigUint) -> Result<BigUint, SwapError> {
    let liquidity = (amount0 * amount1).sqrt();
    if liquidity <= *minimum {
        return Err(SwapError::InsufficientLiquidityMinted {
            liquidity,
            minimum: minimum.clone(),
        });
    }
    Ok(liquidity)
}

/// Quote a proportional add of `amount0` against the current reserves.
///
/// # Arguments
///
/// * `reserves` - Current `(reserve0, reserve1)`
/// * `amount0` - Coin0 the provider adds
/// * `max_amount1` - Most coin1 the provider accepts to add
/// * `total_supply` - Outstanding liquidity before the add
pub fn mint_quote(
    reserves: (&BigUint, &BigUint),
    amount0: &BigUint,
    max_amount1: &BigUint,
    total_supply: &BigUint,
) -> Result<MintQuote, SwapError> {
    let (reserve0, reserve1) = reserves;
    if reserve0.is_zero() {
        return Err(SwapError::InsufficientLiquidity {
            wanted: amount0.clone(),
            available: BigUint::zero(),
        });
    }
    let liquidity = total_supply * amount0 / reserve0;
    if liquidity.is_zero() {
        return Err(SwapError::InsufficientLiquidityMinted {
            liquidity,
            minimum: BigUint::zero(),
        });
    }
    let amount1 = amount0 * reserve1 / reserve0;
    if amount1 > *max_amount1 {
        return Err(SwapError::InsufficientInputAmount1 {
            required: amount1,
            maximum: max_amount1.clone(),
        });
    }
    Ok(MintQuote {
        amount0: amount0.clone(),
        amount1,
        liquidity,
    })
}

/// Amounts returned for burning `liquidity`.
///
/// # Errors
///
/// * [`SwapError::InsufficientLiquidityBurned`] - if either amount falls
///   below the provider's minimum
pub fn burn_quote(
    reserves: (&BigUint, &BigUint),
    liquidity: &BigUint,
    minimums: (&BigUint, &BigUint),
    total_supply: &BigUint,
) -> Result<(BigUint, BigUint), SwapError> {
    if total_supply.is_zero() || *liquidity > *total_supply {
        return Err(SwapError::InsufficientLiquidityBalance {
            liquidity: liquidity.clone(),
            total_supply: total_supply.clone(),
        });
    }
    let (reserve0, reserve1) = reserves;
    let amount0 = liquidity * reserve0 / total_supply;
    let amount1 = liquidity * reserve1 / total_supply;
    if amount0 < *minimums.0 || amount1 < *minimums.1 {
        return Err(SwapError::InsufficientLiquidityBurned {
            amount0,
            amount1,
            minimum0: minimums.0.clone(),
            minimum1: minimums.1.clone(),
        });
    }
    Ok((amount0, amount1))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: u64) -> BigUint {
        BigUint::from(v)
    }

    #[test]
    fn test_initial_liquidity() {
        assert_eq!(initial_liquidity(&n(4_000_000), &n(1_000_000), &n(1000)).unwrap(), n(2_000_000));
        assert!(matches!(
            initial_liquidity(&n(1000), &n(1000), &n(1000)),
            Err(SwapError::InsufficientLiquidityMinted { .. })
        ));
    }

    #[test]
    fn test_mint_quote_proportional() {
        let quote = mint_quote((&n(1000), &n(3000)), &n(100), &n(1000), &n(500)).unwrap();
        assert_eq!(quote.amount1, n(300));
        assert_eq!(quote.liquidity, n(50));
    }

    #[test]
    fn test_mint_quote_limits() {
        assert!(matches!(
            mint_quote((&n(1000), &n(3000)), &n(100), &n(299), &n(500)),
            Err(SwapError::InsufficientInputAmount1 { .. })
        ));
        assert!(matches!(
            mint_quote((&n(1000), &n(3000)), &n(1), &n(10), &n(500)),
            Err(SwapError::InsufficientLiquidityMinted { .. })
        ));
        assert!(mint_quote((&n(0), &n(0)), &n(1), &n(1), &n(1)).is_err());
    }

    #[test]
    fn test_burn_quote() {
        let (a0, a1) = burn_quote((&n(1000), &n(3000)), &n(50), (&n(0), &n(0)), &n(500)).unwrap();
        assert_eq!((a0, a1), (n(100), n(300)));
        assert!(matches!(
            burn_quote((&n(1000), &n(3000)), &n(50), (&n(101), &n(0)), &n(500)),
            Err(SwapError::InsufficientLiquidityBurned { .. })
        ));
        assert!(burn_quote((&n(1000), &n(3000)), &n(501), (&n(0), &n(0)), &n(500)).is_err());
    }
}
