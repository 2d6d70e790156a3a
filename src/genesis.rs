//! Genesis export and import.
//!
//! The export is a flat, ordered picture of the committed engine state:
//! pools by canonical key, each with its resting orders by id, plus the next
//! order id. Amounts are decimal strings so the JSON form survives any
//! consumer's number handling.
//!
//! ```json
//! {
//!   "pools": [{
//!     "coin0": 1, "coin1": 2,
//!     "reserve0": "10000000000000000000000",
//!     "reserve1": "10000000000000000000000",
//!     "id": 1,
//!     "orders": [{
//!       "is_sale": true,
//!       "volume0": "15000000000000000000000",
//!       "volume1": "5000000000000000000000",
//!       "id": 1,
//!       "owner": "0x0707070707070707070707070707070707070707",
//!       "height": 3
//!     }]
//!   }],
//!   "next_order_id": 2
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::ops::ControlFlow;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SwapError;
use crate::pair::PairData;
use crate::store::records::{decode_order, decode_pair, read_counter};
use crate::store::{keys, scan_prefix};
use crate::swap::Swap;
use crate::types::amount::decimal;
use crate::types::{Address, CoinId, LimitOrder, PairKey, Side};

/// Exported engine state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenesisState {
    pub pools: Vec<PoolState>,
    pub next_order_id: u32,
}

/// One pool with its resting orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub coin0: CoinId,
    pub coin1: CoinId,
    #[serde(with = "decimal")]
    pub reserve0: BigUint,
    #[serde(with = "decimal")]
    pub reserve1: BigUint,
    pub id: u32,
    #[serde(default)]
    pub orders: Vec<OrderState>,
}

/// A resting order.
///
/// `volume0`/`volume1` are the remaining amounts of the pool's `coin0` and
/// `coin1`; `is_sale` marks orders selling `coin1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub is_sale: bool,
    #[serde(with = "decimal")]
    pub volume0: BigUint,
    #[serde(with = "decimal")]
    pub volume1: BigUint,
    pub id: u32,
    pub owner: Address,
    pub height: u64,
}

impl OrderState {
    fn from_order(order: &LimitOrder) -> Self {
        let (volume0, volume1) = order.canonical_volumes();
        Self {
            is_sale: order.side.is_sale(),
            volume0,
            volume1,
            id: order.id,
            owner: order.owner,
            height: order.height,
        }
    }

    /// Same order described against the flipped pool orientation
    fn flipped(&self) -> Self {
        Self {
            is_sale: !self.is_sale,
            volume0: self.volume1.clone(),
            volume1: self.volume0.clone(),
            ..self.clone()
        }
    }

    fn into_order(self, pair: PairKey) -> LimitOrder {
        let (side, want_buy, want_sell) = if self.is_sale {
            (Side::Sell, self.volume0, self.volume1)
        } else {
            (Side::Buy, self.volume1, self.volume0)
        };
        LimitOrder::new(self.id, pair, side, self.owner, want_buy, want_sell, self.height)
    }
}

impl GenesisState {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Number of orders across all pools
    pub fn order_count(&self) -> usize {
        self.pools.iter().map(|pool| pool.orders.len()).sum()
    }
}

impl Swap {
    /// Export the committed state of the current snapshot.
    ///
    /// Changes not yet committed are not included. When `cancel` fires the
    /// export stops and returns the pools collected so far.
    pub fn export(&self, cancel: &CancellationToken) -> GenesisState {
        let snapshot = self.snapshot();

        let mut pools = BTreeMap::new();
        scan_prefix(snapshot.as_ref(), &keys::pairs_prefix(), None, &mut |key, value| {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            let pair = match keys::parse_pair(key) {
                Some(pair) => pair,
                None => panic!("corrupted pair key {}", hex::encode(key)),
            };
            let (reserve0, reserve1, id) = match decode_pair(value) {
                Some(record) => record,
                None => panic!("corrupted pair record {}", pair),
            };
            pools.insert(
                pair,
                PoolState {
                    coin0: pair.coin0,
                    coin1: pair.coin1,
                    reserve0,
                    reserve1,
                    id,
                    orders: Vec::new(),
                },
            );
            ControlFlow::Continue(())
        });

        // Order records are keyed by id, so each pool's list comes out sorted
        scan_prefix(snapshot.as_ref(), &keys::orders_prefix(), None, &mut |key, value| {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            let id = match keys::parse_order(key) {
                Some(id) => id,
                None => panic!("corrupted order key {}", hex::encode(key)),
            };
            let order = match decode_order(id, value) {
                Some(order) => order,
                None => panic!("corrupted order record {}", id),
            };
            match pools.get_mut(&order.pair) {
                Some(pool) => pool.orders.push(OrderState::from_order(&order)),
                None => panic!("order {} references missing pair {}", id, order.pair),
            }
            ControlFlow::Continue(())
        });

        let state = GenesisState {
            pools: pools.into_values().collect(),
            next_order_id: read_counter(snapshot.as_ref(), &keys::next_order_id()).unwrap_or(1),
        };
        info!(
            version = snapshot.version(),
            pools = state.pools.len(),
            orders = state.order_count(),
            cancelled = cancel.is_cancelled(),
            "swap state exported"
        );
        state
    }

    /// Load exported state into an engine with no conflicting pools.
    ///
    /// Reserves and order escrow are noted to the solvency checker as if the
    /// pools had been created and the orders placed; account balances are
    /// left untouched. Everything imported is dirty until the next commit.
    ///
    /// The whole state is validated first; on error nothing is imported.
    ///
    /// # Errors
    ///
    /// * [`SwapError::IdenticalCoins`] - a pool pairs a coin with itself
    /// * [`SwapError::PairExists`] - a pool is already present, or listed
    ///   twice in either orientation
    /// * [`SwapError::OrderExists`] - an order id is listed twice or is
    ///   already live
    pub fn import(&self, state: &GenesisState) -> Result<(), SwapError> {
        self.validate_import(state)?;

        for pool in &state.pools {
            let view = PairKey::new(pool.coin0, pool.coin1);
            let key = view.sorted();
            let (reserve0, reserve1) = if view.is_sorted() {
                (pool.reserve0.clone(), pool.reserve1.clone())
            } else {
                (pool.reserve1.clone(), pool.reserve0.clone())
            };
            self.bus().note_in(key.coin0, &reserve0);
            self.bus().note_in(key.coin1, &reserve1);
            let pair = self.insert_pair(
                key,
                PairData {
                    reserve0,
                    reserve1,
                    id: pool.id,
                },
            );
            self.note_imported_pool(key, pool.id);

            for order in &pool.orders {
                let canonical = if view.is_sorted() {
                    order.clone()
                } else {
                    order.flipped()
                };
                let order = canonical.into_order(key);
                self.bus().note_in(order.coin_sell(), &order.want_sell);
                self.note_imported_order(order.id, key);
                pair.insert_order(order);
            }
            debug!(pair = %key, pool_id = pool.id, orders = pool.orders.len(), "pool imported");
        }
        self.raise_next_order_id(state.next_order_id);

        info!(pools = state.pools.len(), orders = state.order_count(), "swap state imported");
        Ok(())
    }

    /// Check an import against itself and the engine without changing either
    fn validate_import(&self, state: &GenesisState) -> Result<(), SwapError> {
        let mut pairs = HashSet::new();
        let mut orders = HashSet::new();
        for pool in &state.pools {
            let view = PairKey::new(pool.coin0, pool.coin1);
            if view.is_identical() {
                return Err(SwapError::IdenticalCoins(pool.coin0));
            }
            let key = view.sorted();
            if !pairs.insert(key) || self.load_pair(key).is_some() {
                return Err(SwapError::PairExists(key));
            }
            for order in &pool.orders {
                if !orders.insert(order.id) || self.order(order.id).is_some() {
                    return Err(SwapError::OrderExists(order.id));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
