//! Automated market maker arithmetic.
//!
//! ## Components
//!
//! - [`fee`]: Pool fee and order commission rounding
//! - [`Curve`]: Immutable constant-product curve with hypothetical steps
//! - [`liquidity`]: Pool creation, mint and burn quotes
//!
//! No floating point is involved in any balance-affecting value; every
//! function works on [`num_bigint::BigUint`] and rounds toward the pool.

pub mod fee;
pub mod curve;
pub mod liquidity;

pub use curve::Curve;
pub use liquidity::MintQuote;
