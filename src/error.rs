//! Error types.
//!
//! [`SwapError`] covers caller-facing validation failures: the transaction
//! layer checks requests with the `check_*` helpers before executing them and
//! turns these errors into user-facing responses. Broken engine invariants
//! (constant product violated, removing an order that is not indexed,
//! corrupted store records) are not errors; they panic.

use num_bigint::BigUint;
use thiserror::Error;

use crate::types::{Address, CoinId, PairKey, Price};

/// Validation failure reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error("identical coin ids: {0}")]
    IdenticalCoins(CoinId),

    #[error("pair {0} does not exist")]
    PairNotExists(PairKey),

    #[error("pair {0} already exists")]
    PairExists(PairKey),

    #[error("insufficient liquidity: wanted {wanted}, available {available}")]
    InsufficientLiquidity { wanted: BigUint, available: BigUint },

    #[error("insufficient input amount")]
    InsufficientInputAmount,

    #[error("insufficient output amount")]
    InsufficientOutputAmount,

    #[error("swap would decrease the fee-adjusted constant product")]
    K,

    #[error("insufficient liquidity minted: {liquidity}, must exceed {minimum}")]
    InsufficientLiquidityMinted { liquidity: BigUint, minimum: BigUint },

    #[error("required coin1 amount {required} exceeds maximum {maximum}")]
    InsufficientInputAmount1 { required: BigUint, maximum: BigUint },

    #[error("liquidity {liquidity} exceeds total supply {total_supply}")]
    InsufficientLiquidityBalance { liquidity: BigUint, total_supply: BigUint },

    #[error("insufficient liquidity burned: got ({amount0}, {amount1}), minimum ({minimum0}, {minimum1})")]
    InsufficientLiquidityBurned {
        amount0: BigUint,
        amount1: BigUint,
        minimum0: BigUint,
        minimum1: BigUint,
    },

    #[error("order volume below minimum {minimum}: buy {want_buy}, sell {want_sell}")]
    WrongOrderVolume {
        want_buy: BigUint,
        want_sell: BigUint,
        minimum: BigUint,
    },

    #[error("order price {price} outside allowed band [{min}, {max}]")]
    WrongOrderPrice { price: Price, min: Price, max: Price },

    #[error("insufficient funds: {address} needs {wanted} of coin {coin}, has {available}")]
    InsufficientFunds {
        address: Address,
        coin: CoinId,
        wanted: BigUint,
        available: BigUint,
    },

    #[error("output {amount_out} is below the minimum {minimum}")]
    MinimumOutput { amount_out: BigUint, minimum: BigUint },

    #[error("input {amount_in} exceeds the maximum {maximum}")]
    MaximumInput { amount_in: BigUint, maximum: BigUint },

    #[error("order {0} not found")]
    OrderNotFound(u32),

    #[error("order {0} already exists")]
    OrderExists(u32),

    #[error("order {id} is not owned by {address}")]
    OrderNotOwned { id: u32, address: Address },
}

/// Failure while flushing state to the store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{field} amount {amount} does not fit a 256-bit word")]
    AmountOverflow { field: &'static str, amount: BigUint },

    #[error("ssz encoding failed: {0}")]
    Encode(String),
}
