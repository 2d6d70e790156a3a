//! Matching engine for the hybrid pool.
//!
//! ## Design Principles
//!
//! The engine is designed for:
//!
//! 1. **Determinism**: Same reserves and book always produce the same plan
//! 2. **Integer Math**: Every amount is a `BigUint`, rounding toward the pool
//! 3. **Synchronous Execution**: No async/await in the hot path
//! 4. **Price-Time Priority**: Best price first, then lowest id
//!
//! ## Matching Rules
//!
//! - **Exact input**: the taker sells a fixed amount and receives what the
//!   curve and the book yield
//! - **Exact output**: the taker receives a fixed amount and pays what it
//!   costs
//! - **Curve steps** happen only between orders, down to the next order's
//!   price
//! - **Planning is pure**: walks produce a [`MatchPlan`]; the pair applies
//!   it afterwards
//!
//! ## Example
//!
//! ```
//! use hybrid_swap::amm::Curve;
//! use hybrid_swap::engine::{sell_exact_in, OrderQuote};
//! use hybrid_swap::types::Address;
//! use num_bigint::BigUint;
//!
//! let e18 = |v: u32| BigUint::from(v) * BigUint::from(10u32).pow(18);
//! let curve = Curve::new(e18(10_000), e18(10_000));
//!
//! // Resting order sells 5000 for 15000 of the taker's coin
//! let order = OrderQuote::new(1, Address::default(), e18(15_000), e18(5_000));
//! let plan = sell_exact_in(&curve, vec![order], &e18(10_000)).unwrap();
//!
//! assert_eq!(plan.fills.len(), 1);
//! assert!(plan.amount_out > BigUint::from(0u32));
//! ```

pub mod matcher;

pub use matcher::{apply_delta, buy_exact_out, sell_exact_in, BookCursor, MatchPlan, OrderQuote};
