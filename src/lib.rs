//! # Hybrid Swap
//!
//! Deterministic swap-pair engine: a constant-product pool whose trades are
//! routed through a persisted limit order book on the same pair.
//!
//! ## Architecture
//!
//! The engine consists of:
//! - **Types**: Core data structures (PairKey, LimitOrder, OrderFill, SwapReceipt)
//! - **AMM**: Fee arithmetic, curve math and liquidity issuance
//! - **OrderBook**: Lazily loaded price index per pair
//! - **Engine**: Pure matching walks across curve and book
//! - **Swap**: Registry of pairs, orders and counters; commit protocol
//! - **Store**: Versioned key-value interface and an in-memory Merkle tree
//!
//! ## Design Principles
//!
//! 1. **Determinism**: Identical operations produce identical store roots
//! 2. **No Floating Point**: Amounts are arbitrary-precision integers
//! 3. **Rounding Favors the Pool**: Every division rounds against the taker
//! 4. **Synchronous Execution**: No async in the hot path
//!
//! ## Block Lifecycle
//!
//! ```
//! use hybrid_swap::{EngineConfig, MemoryBus, MemoryTree, Swap};
//! use hybrid_swap::ledger::BalanceLedger;
//! use hybrid_swap::types::{Address, CoinId};
//! use num_bigint::BigUint;
//!
//! let mut tree = MemoryTree::new();
//! let bus = MemoryBus::new();
//! let swap = Swap::new(tree.latest(), bus.bus(), EngineConfig::default());
//!
//! let provider = Address::new([1; 20]);
//! let e18 = |v: u32| BigUint::from(v) * BigUint::from(10u32).pow(18);
//! bus.ledger.credit(&provider, CoinId(1), &e18(1_000));
//! bus.ledger.credit(&provider, CoinId(2), &e18(1_000));
//! swap.create_pool(&provider, CoinId(1), CoinId(2), &e18(1_000), &e18(1_000)).unwrap();
//!
//! let trader = Address::new([2; 20]);
//! let receipt = swap
//!     .sell_with_orders(&trader, CoinId(1), CoinId(2), &e18(10), &BigUint::from(0u32))
//!     .unwrap();
//! assert!(receipt.amount_out < e18(10));
//!
//! swap.commit(&mut tree).unwrap();
//! swap.set_snapshot(tree.commit_version());
//! ```

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: coins, pairs, orders, fills and receipts
pub mod types;

/// Constant-product curve, fees and liquidity math
pub mod amm;

/// Order book: per-pair lazily loaded price index
pub mod orderbook;

/// Matching engine: pure walks producing match plans
pub mod engine;

/// Versioned store interface, key layout and records
pub mod store;

/// Pairs and directional views
pub mod pair;

/// Engine registry and commit protocol
pub mod swap;

/// Balance ledger, solvency checker and event sink
pub mod ledger;

/// Genesis export and import
pub mod genesis;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use types::{Address, CoinId, LimitOrder, OrderFill, PairKey, Price, Side, SwapReceipt};
pub use pair::{PairHandle, SteppedPair};
pub use swap::{PoolCreated, Swap};
pub use ledger::{Bus, MemoryBus};
pub use store::{MemoryTree, Snapshot, StoreWriter};
pub use genesis::GenesisState;
pub use config::EngineConfig;
pub use error::{StoreError, SwapError};
