//! Engine configuration.
//!
//! Protocol constants that changed across protocol versions live here instead
//! of in the code paths that use them. Every field has a default, so a
//! partial JSON document is a valid configuration.
//!
//! ```
//! use hybrid_swap::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "order_expiry_blocks": 5 }"#).unwrap();
//! assert_eq!(config.order_expiry_blocks, 5);
//! assert_eq!(config.order_price_band, 5);
//! ```

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Default minimum for both legs of a limit order
pub const DEFAULT_MIN_ORDER_VOLUME: u64 = 10_000_000_000;

/// Default price band divisor for new orders
pub const DEFAULT_ORDER_PRICE_BAND: u32 = 5;

/// Default order lifetime in blocks (30 days of 5-second blocks)
pub const DEFAULT_ORDER_EXPIRY_BLOCKS: u64 = 518_400;

/// Default lower bound (exclusive) on initial pool liquidity
pub const DEFAULT_MINIMUM_LIQUIDITY: u64 = 1000;

/// Default number of orders per book side kept in memory after commit
pub const DEFAULT_CACHE_RETAIN: usize = 10_000;

/// Default number of index entries fetched per lazy range scan
pub const DEFAULT_LOAD_BATCH: usize = 64;

/// Tunable parameters of the swap engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest accepted `want_buy` and `want_sell` of a new order
    pub min_order_volume: u64,

    /// A new order's price must lie within `[curve / band, curve]`
    pub order_price_band: u32,

    /// Orders older than this many blocks are expired
    pub order_expiry_blocks: u64,

    /// Initial pool liquidity must exceed this value
    pub minimum_liquidity: u64,

    /// Orders per book side kept materialized after each commit
    pub cache_retain: usize,

    /// Index entries fetched per lazy range scan
    pub load_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_order_volume: DEFAULT_MIN_ORDER_VOLUME,
            order_price_band: DEFAULT_ORDER_PRICE_BAND,
            order_expiry_blocks: DEFAULT_ORDER_EXPIRY_BLOCKS,
            minimum_liquidity: DEFAULT_MINIMUM_LIQUIDITY,
            cache_retain: DEFAULT_CACHE_RETAIN,
            load_batch: DEFAULT_LOAD_BATCH,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Minimum order volume as an amount
    pub fn min_order_volume(&self) -> BigUint {
        BigUint::from(self.min_order_volume)
    }

    /// Minimum liquidity as an amount
    pub fn minimum_liquidity(&self) -> BigUint {
        BigUint::from(self.minimum_liquidity)
    }

    /// Threshold height for an expiry sweep at `height`.
    ///
    /// Orders created at or below the returned height are expired; `None`
    /// while the chain is younger than the expiry window.
    pub fn expiry_threshold(&self, height: u64) -> Option<u64> {
        height.checked_sub(self.order_expiry_blocks)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
