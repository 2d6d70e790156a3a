//! Core data types for the swap engine
//!
//! ## Types
//!
//! - [`CoinId`], [`Address`], [`PairKey`]: identities
//! - [`Price`]: 128-bit binary float used for ordering and display
//! - [`LimitOrder`] and [`Side`]: resting orders
//! - [`OrderFill`]: a match between a taker and a resting order
//! - [`SwapReceipt`]: outcome of an executed swap
//!
//! ## Amounts
//!
//! All amounts are arbitrary-precision [`num_bigint::BigUint`] values; see
//! [`amount`] for persistence and serde helpers.

mod coin;
mod order;
mod fill;
mod receipt;
pub mod amount;
pub mod price;

// Re-export all types at module level
pub use coin::{Address, CoinId, PairKey, ADDRESS_LEN};
pub use order::{LimitOrder, Side};
pub use fill::OrderFill;
pub use receipt::{MakerPayout, OrderRefund, PoolDelta, SwapReceipt};
pub use amount::Amount;
pub use price::Price;
