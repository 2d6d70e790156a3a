//! The swap engine: registry of pairs, orders and counters.
//!
//! ## Architecture
//!
//! ```text
//!              +-------------------------------+
//!              |             Swap              |
//!              |  pairs:    RwLock<HashMap>    |  structural changes
//!              |  dirty:    Mutex<DirtySets>   |  pending mutations
//!              |  counters: Mutex<Counters>    |  pool / order ids
//!              +---------------+---------------+
//!                              | Arc<Pair>
//!              +---------------v---------------+
//!              |  reserves: RwLock<PairData>   |  per-pair locks
//!              |  book:     Mutex<OrderBook>   |
//!              +-------------------------------+
//! ```
//!
//! Pairs are materialized from the snapshot on first access and stay in the
//! registry. Mutations on a pair return a [`Changed`] signal that the
//! registry folds into its dirty sets; [`Swap::commit`] flushes exactly those.
//!
//! ## Block lifecycle
//!
//! 1. Execute operations against the current snapshot
//! 2. [`Swap::commit`] into the store's writer
//! 3. [`Swap::set_snapshot`] with the version the store sealed
//!
//! No reads may happen between steps 2 and 3: lazy loads would consult the
//! previous version.
//!
//! ## Balance flows
//!
//! Maker payouts, order escrow, refunds and liquidity settlements go through
//! the [`Bus`] ledger and are noted to the solvency checker. The taker's own
//! debit and credit are reported in the [`SwapReceipt`] and applied by the
//! caller.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::amm::liquidity::initial_liquidity;
use crate::amm::MintQuote;
use crate::config::EngineConfig;
use crate::engine::MatchPlan;
use crate::error::{StoreError, SwapError};
use crate::ledger::{Bus, OrderExpired};
use crate::pair::{Changed, Execution, Pair, PairData, PairHandle, SharedSnapshot, Trade};
use crate::store::records::{decode_order, encode_counter, read_counter, read_order, read_pair};
use crate::store::{keys, scan_prefix, Snapshot, StoreWriter};
use crate::types::{Address, CoinId, LimitOrder, MakerPayout, OrderRefund, PairKey, Price, SwapReceipt};

// ============================================================================
// Registry state
// ============================================================================

/// A persisted monotonic id counter, loaded lazily
#[derive(Debug, Default)]
struct Counter {
    next: Option<u32>,
    dirty: bool,
}

impl Counter {
    fn peek(&mut self, snapshot: &dyn Snapshot, key: &[u8]) -> u32 {
        *self
            .next
            .get_or_insert_with(|| read_counter(snapshot, key).unwrap_or(1))
    }

    fn allocate(&mut self, snapshot: &dyn Snapshot, key: &[u8]) -> u32 {
        let id = self.peek(snapshot, key);
        let next = match id.checked_add(1) {
            Some(next) => next,
            None => panic!("id counter {} exhausted", hex::encode(key)),
        };
        self.next = Some(next);
        self.dirty = true;
        id
    }

    /// Move the counter forward to at least `next`
    fn raise(&mut self, snapshot: &dyn Snapshot, key: &[u8], next: u32) {
        if self.peek(snapshot, key) < next {
            self.next = Some(next);
            self.dirty = true;
        }
    }

    /// Write the counter if it advanced; it stays dirty until `mark_clean`
    fn write(&self, writer: &mut dyn StoreWriter, key: &[u8]) -> Result<(), StoreError> {
        if let (true, Some(next)) = (self.dirty, self.next) {
            writer.set(key, &encode_counter(next)?);
        }
        Ok(())
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[derive(Debug, Default)]
struct Counters {
    pools: Counter,
    orders: Counter,
}

#[derive(Debug, Default)]
struct DirtySets {
    pairs: BTreeSet<PairKey>,
    order_pairs: BTreeSet<PairKey>,
    /// Pair of every order placed since the last snapshot swap
    placed: HashMap<u32, PairKey>,
}

/// Outcome of [`Swap::create_pool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCreated {
    pub pool_id: u32,
    /// Liquidity to mint for the provider
    pub liquidity: BigUint,
}

/// Keys sorted by descending canonical bytes, the commit order
fn commit_order(keys: &BTreeSet<PairKey>) -> Vec<PairKey> {
    let mut keys: Vec<PairKey> = keys.iter().copied().collect();
    keys.sort_by_key(|key| Reverse(key.to_bytes()));
    keys
}

// ============================================================================
// Swap
// ============================================================================

/// Hybrid AMM and order book engine over a versioned store.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use hybrid_swap::{EngineConfig, MemoryBus, MemoryTree, Swap};
/// use hybrid_swap::ledger::BalanceLedger;
/// use hybrid_swap::types::{Address, CoinId};
/// use num_bigint::BigUint;
///
/// let mut tree = MemoryTree::new();
/// let bus = MemoryBus::new();
/// let swap = Swap::new(tree.latest(), bus.bus(), EngineConfig::default());
///
/// let provider = Address::new([1; 20]);
/// let e18 = |v: u32| BigUint::from(v) * BigUint::from(10u32).pow(18);
/// bus.ledger.credit(&provider, CoinId(1), &e18(100));
/// bus.ledger.credit(&provider, CoinId(2), &e18(100));
///
/// let created = swap.create_pool(&provider, CoinId(1), CoinId(2), &e18(100), &e18(100)).unwrap();
/// assert_eq!(created.pool_id, 1);
///
/// swap.commit(&mut tree).unwrap();
/// swap.set_snapshot(tree.commit_version());
/// assert!(swap.pair(CoinId(2), CoinId(1)).is_some());
/// ```
pub struct Swap {
    config: EngineConfig,
    bus: Bus,
    snapshot: SharedSnapshot,
    pairs: RwLock<HashMap<PairKey, Option<Arc<Pair>>>>,
    dirty: Mutex<DirtySets>,
    counters: Mutex<Counters>,
}

impl std::fmt::Debug for Swap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swap")
            .field("config", &self.config)
            .field("version", &self.snapshot().version())
            .field("dirty", &*self.dirty.lock())
            .finish_non_exhaustive()
    }
}

impl Swap {
    /// Create an engine reading from `snapshot`
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Committed store version to read from
    /// * `bus` - Ledger, solvency checker and event sink
    /// * `config` - Engine parameters
    pub fn new(snapshot: Arc<dyn Snapshot>, bus: Bus, config: EngineConfig) -> Self {
        Self {
            config,
            bus,
            snapshot: Arc::new(RwLock::new(snapshot)),
            pairs: RwLock::new(HashMap::new()),
            dirty: Mutex::new(DirtySets::default()),
            counters: Mutex::new(Counters::default()),
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot currently read from
    pub fn snapshot(&self) -> Arc<dyn Snapshot> {
        self.snapshot.read().clone()
    }

    /// Swap in the version sealed after [`Swap::commit`].
    ///
    /// Materialized pairs and order caches are kept; they match the new
    /// version.
    pub fn set_snapshot(&self, snapshot: Arc<dyn Snapshot>) {
        let version = snapshot.version();
        *self.snapshot.write() = snapshot;
        self.dirty.lock().placed.clear();
        debug!(version, "swap snapshot advanced");
    }

    /// Point the engine at an arbitrary version, dropping every cache.
    ///
    /// Uncommitted changes are discarded.
    pub fn reset_snapshot(&self, snapshot: Arc<dyn Snapshot>) {
        let version = snapshot.version();
        *self.snapshot.write() = snapshot;
        self.pairs.write().clear();
        *self.dirty.lock() = DirtySets::default();
        *self.counters.lock() = Counters::default();
        warn!(version, "swap state reset to snapshot");
    }

    // ========================================================================
    // Pair registry
    // ========================================================================

    /// Materialize a canonical pair, caching absence as well
    pub(crate) fn load_pair(&self, key: PairKey) -> Option<Arc<Pair>> {
        if let Some(entry) = self.pairs.read().get(&key) {
            return entry.clone();
        }
        let snapshot = self.snapshot();
        let loaded = read_pair(snapshot.as_ref(), &key).map(|(reserve0, reserve1, id)| {
            let data = PairData {
                reserve0,
                reserve1,
                id,
            };
            Arc::new(Pair::new(key, data, self.config.load_batch, self.snapshot.clone()))
        });
        self.pairs.write().entry(key).or_insert(loaded).clone()
    }

    /// Register a pair created in this block.
    ///
    /// # Panics
    ///
    /// Panics if the pair already exists.
    pub(crate) fn insert_pair(&self, key: PairKey, data: PairData) -> Arc<Pair> {
        let pair = Arc::new(Pair::new(key, data, self.config.load_batch, self.snapshot.clone()));
        let mut pairs = self.pairs.write();
        if let Some(Some(_)) = pairs.get(&key) {
            panic!("pair {} registered twice", key);
        }
        pairs.insert(key, Some(pair.clone()));
        pair
    }

    /// View of the pair trading `coin0` for `coin1`
    pub fn pair(&self, coin0: CoinId, coin1: CoinId) -> Option<PairHandle> {
        let key = PairKey::new(coin0, coin1);
        if key.is_identical() {
            return None;
        }
        let pair = self.load_pair(key.sorted())?;
        Some(PairHandle::new(pair, !key.is_sorted()))
    }

    pub fn pair_exists(&self, coin0: CoinId, coin1: CoinId) -> bool {
        self.pair(coin0, coin1).is_some()
    }

    fn require_pair(&self, coin0: CoinId, coin1: CoinId) -> Result<PairHandle, SwapError> {
        if coin0 == coin1 {
            return Err(SwapError::IdenticalCoins(coin0));
        }
        self.pair(coin0, coin1)
            .ok_or_else(|| SwapError::PairNotExists(PairKey::new(coin0, coin1)))
    }

    /// Pool id the next created pool receives
    pub fn next_pool_id(&self) -> u32 {
        let snapshot = self.snapshot();
        self.counters.lock().pools.peek(snapshot.as_ref(), &keys::next_pool_id())
    }

    /// Order id the next placed order receives
    pub fn next_order_id(&self) -> u32 {
        let snapshot = self.snapshot();
        self.counters.lock().orders.peek(snapshot.as_ref(), &keys::next_order_id())
    }

    /// Every pool, persisted or created in this block, by canonical key.
    ///
    /// Stops early and returns what it has when `cancel` fires.
    pub fn pools(&self, cancel: &CancellationToken) -> Vec<PairHandle> {
        let snapshot = self.snapshot();
        let mut found = BTreeSet::new();
        scan_prefix(snapshot.as_ref(), &keys::pairs_prefix(), None, &mut |key, _| {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            match keys::parse_pair(key) {
                Some(pair) => found.insert(pair),
                None => panic!("corrupted pair key {}", hex::encode(key)),
            };
            ControlFlow::Continue(())
        });
        found.extend(
            self.pairs
                .read()
                .iter()
                .filter(|(_, pair)| pair.is_some())
                .map(|(key, _)| *key),
        );

        let mut pools = Vec::with_capacity(found.len());
        for key in found {
            if cancel.is_cancelled() {
                debug!(collected = pools.len(), "pool enumeration cancelled");
                break;
            }
            if let Some(pair) = self.load_pair(key) {
                pools.push(PairHandle::new(pair, false));
            }
        }
        pools
    }

    fn mark(&self, key: PairKey, changed: Changed) {
        let mut dirty = self.dirty.lock();
        if changed.reserves {
            dirty.pairs.insert(key);
        }
        if changed.orders {
            dirty.order_pairs.insert(key);
        }
    }

    fn require_balance(&self, owner: &Address, coin: CoinId, wanted: &BigUint) -> Result<(), SwapError> {
        let available = self.bus.ledger.balance(owner, coin);
        if available < *wanted {
            return Err(SwapError::InsufficientFunds {
                address: *owner,
                coin,
                wanted: wanted.clone(),
                available,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Liquidity
    // ========================================================================

    /// Validate a pool creation, returning the initial liquidity
    pub fn check_create(
        &self,
        provider: &Address,
        coin_a: CoinId,
        coin_b: CoinId,
        amount_a: &BigUint,
        amount_b: &BigUint,
    ) -> Result<BigUint, SwapError> {
        if coin_a == coin_b {
            return Err(SwapError::IdenticalCoins(coin_a));
        }
        if self.pair_exists(coin_a, coin_b) {
            return Err(SwapError::PairExists(PairKey::new(coin_a, coin_b).sorted()));
        }
        let liquidity = initial_liquidity(amount_a, amount_b, &self.config.minimum_liquidity())?;
        self.require_balance(provider, coin_a, amount_a)?;
        self.require_balance(provider, coin_b, amount_b)?;
        Ok(liquidity)
    }

    /// Create a pool with initial reserves taken from `provider`.
    ///
    /// The caller mints the returned liquidity.
    pub fn create_pool(
        &self,
        provider: &Address,
        coin_a: CoinId,
        coin_b: CoinId,
        amount_a: &BigUint,
        amount_b: &BigUint,
    ) -> Result<PoolCreated, SwapError> {
        let liquidity = self.check_create(provider, coin_a, coin_b, amount_a, amount_b)?;
        let view = PairKey::new(coin_a, coin_b);
        let key = view.sorted();
        let (reserve0, reserve1) = if view.is_sorted() {
            (amount_a.clone(), amount_b.clone())
        } else {
            (amount_b.clone(), amount_a.clone())
        };

        let snapshot = self.snapshot();
        let pool_id = self.counters.lock().pools.allocate(snapshot.as_ref(), &keys::next_pool_id());
        self.insert_pair(
            key,
            PairData {
                reserve0,
                reserve1,
                id: pool_id,
            },
        );

        self.bus.ledger.debit(provider, coin_a, amount_a);
        self.bus.ledger.debit(provider, coin_b, amount_b);
        self.bus.note_in(coin_a, amount_a);
        self.bus.note_in(coin_b, amount_b);
        self.mark(key, Changed::RESERVES);

        info!(pair = %key, pool_id, liquidity = %liquidity, "pool created");
        Ok(PoolCreated { pool_id, liquidity })
    }

    /// Validate a liquidity add; amounts are in `(coin_a, coin_b)` order
    pub fn check_mint(
        &self,
        provider: &Address,
        coin_a: CoinId,
        coin_b: CoinId,
        amount_a: &BigUint,
        max_amount_b: &BigUint,
        total_supply: &BigUint,
    ) -> Result<MintQuote, SwapError> {
        let handle = self.require_pair(coin_a, coin_b)?;
        let quote = handle
            .pair()
            .quote_mint(handle.is_reversed(), amount_a, max_amount_b, total_supply)?;
        self.require_balance(provider, coin_a, &quote.amount0)?;
        self.require_balance(provider, coin_b, &quote.amount1)?;
        Ok(quote)
    }

    /// Add liquidity proportionally.
    ///
    /// The quote's `amount0`/`amount1` are `coin_a`/`coin_b` amounts; the
    /// caller mints `liquidity`.
    pub fn add_liquidity(
        &self,
        provider: &Address,
        coin_a: CoinId,
        coin_b: CoinId,
        amount_a: &BigUint,
        max_amount_b: &BigUint,
        total_supply: &BigUint,
    ) -> Result<MintQuote, SwapError> {
        let handle = self.require_pair(coin_a, coin_b)?;
        let quote = handle.pair().mint(
            handle.is_reversed(),
            amount_a,
            max_amount_b,
            total_supply,
            |quote| {
                self.require_balance(provider, coin_a, &quote.amount0)?;
                self.require_balance(provider, coin_b, &quote.amount1)
            },
        )?;

        self.bus.ledger.debit(provider, coin_a, &quote.amount0);
        self.bus.ledger.debit(provider, coin_b, &quote.amount1);
        self.bus.note_in(coin_a, &quote.amount0);
        self.bus.note_in(coin_b, &quote.amount1);
        self.mark(handle.pair().key(), Changed::RESERVES);

        debug!(pair = %handle.key(), amount0 = %quote.amount0, amount1 = %quote.amount1, liquidity = %quote.liquidity, "liquidity added");
        Ok(quote)
    }

    /// Validate a withdrawal, returning `(amount_a, amount_b)`
    pub fn check_burn(
        &self,
        coin_a: CoinId,
        coin_b: CoinId,
        liquidity: &BigUint,
        min_amount_a: &BigUint,
        min_amount_b: &BigUint,
        total_supply: &BigUint,
    ) -> Result<(BigUint, BigUint), SwapError> {
        let handle = self.require_pair(coin_a, coin_b)?;
        handle
            .pair()
            .quote_burn(handle.is_reversed(), liquidity, (min_amount_a, min_amount_b), total_supply)
    }

    /// Withdraw liquidity to `provider`; the caller burns `liquidity`
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity(
        &self,
        provider: &Address,
        coin_a: CoinId,
        coin_b: CoinId,
        liquidity: &BigUint,
        min_amount_a: &BigUint,
        min_amount_b: &BigUint,
        total_supply: &BigUint,
    ) -> Result<(BigUint, BigUint), SwapError> {
        let handle = self.require_pair(coin_a, coin_b)?;
        let (amount_a, amount_b) =
            handle
                .pair()
                .burn(handle.is_reversed(), liquidity, (min_amount_a, min_amount_b), total_supply)?;

        self.bus.ledger.credit(provider, coin_a, &amount_a);
        self.bus.ledger.credit(provider, coin_b, &amount_b);
        self.bus.note_out(coin_a, &amount_a);
        self.bus.note_out(coin_b, &amount_b);
        self.mark(handle.pair().key(), Changed::RESERVES);

        debug!(pair = %handle.key(), amount0 = %amount_a, amount1 = %amount_b, "liquidity removed");
        Ok((amount_a, amount_b))
    }

    // ========================================================================
    // Swaps
    // ========================================================================

    /// Simulate selling exactly `amount_in`, enforcing the output limit
    pub fn check_sell(
        &self,
        coin_in: CoinId,
        coin_out: CoinId,
        amount_in: &BigUint,
        min_amount_out: &BigUint,
    ) -> Result<MatchPlan, SwapError> {
        let handle = self.require_pair(coin_in, coin_out)?;
        let plan = handle.plan_sell(amount_in).ok_or(SwapError::InsufficientOutputAmount)?;
        if plan.amount_out < *min_amount_out {
            return Err(SwapError::MinimumOutput {
                amount_out: plan.amount_out,
                minimum: min_amount_out.clone(),
            });
        }
        Ok(plan)
    }

    /// Simulate buying exactly `amount_out`, enforcing the input limit
    pub fn check_buy(
        &self,
        coin_in: CoinId,
        coin_out: CoinId,
        amount_out: &BigUint,
        max_amount_in: &BigUint,
    ) -> Result<MatchPlan, SwapError> {
        let handle = self.require_pair(coin_in, coin_out)?;
        let plan = handle.plan_buy(amount_out).ok_or_else(|| SwapError::InsufficientLiquidity {
            wanted: amount_out.clone(),
            available: handle.reserves().1,
        })?;
        if plan.amount_in > *max_amount_in {
            return Err(SwapError::MaximumInput {
                amount_in: plan.amount_in,
                maximum: max_amount_in.clone(),
            });
        }
        Ok(plan)
    }

    /// Sell exactly `amount_in` of `coin_in` across the pool and its book.
    ///
    /// # Panics
    ///
    /// Panics if `amount_in` is zero.
    pub fn sell_with_orders(
        &self,
        trader: &Address,
        coin_in: CoinId,
        coin_out: CoinId,
        amount_in: &BigUint,
        min_amount_out: &BigUint,
    ) -> Result<SwapReceipt, SwapError> {
        assert!(!amount_in.is_zero(), "sell of zero {}", coin_in);
        let handle = self.require_pair(coin_in, coin_out)?;
        let trade = Trade::ExactIn {
            amount_in: amount_in.clone(),
            min_amount_out: min_amount_out.clone(),
        };
        let execution = handle.pair().execute(handle.is_reversed(), &trade)?;
        Ok(self.settle_swap(trader, &handle, execution))
    }

    /// Buy exactly `amount_out` of `coin_out` across the pool and its book.
    ///
    /// # Panics
    ///
    /// Panics if `amount_out` is zero.
    pub fn buy_with_orders(
        &self,
        trader: &Address,
        coin_in: CoinId,
        coin_out: CoinId,
        amount_out: &BigUint,
        max_amount_in: &BigUint,
    ) -> Result<SwapReceipt, SwapError> {
        assert!(!amount_out.is_zero(), "buy of zero {}", coin_out);
        let handle = self.require_pair(coin_in, coin_out)?;
        let trade = Trade::ExactOut {
            amount_out: amount_out.clone(),
            max_amount_in: max_amount_in.clone(),
        };
        let execution = handle.pair().execute(handle.is_reversed(), &trade)?;
        Ok(self.settle_swap(trader, &handle, execution))
    }

    /// Pay makers, refund dust, note flows and build the receipt
    fn settle_swap(&self, trader: &Address, handle: &PairHandle, execution: Execution) -> SwapReceipt {
        let direction = handle.key();
        let (coin_in, coin_out) = (direction.coin0, direction.coin1);
        let Execution {
            plan,
            delta,
            residuals,
            changed,
        } = execution;

        let mut payouts = Vec::with_capacity(plan.fills.len());
        for fill in &plan.fills {
            let amount = fill.maker_payout();
            if amount.is_zero() {
                continue;
            }
            self.bus.ledger.credit(&fill.owner, coin_in, &amount);
            payouts.push(MakerPayout {
                order_id: fill.order_id,
                owner: fill.owner,
                coin: coin_in,
                amount,
            });
        }

        let mut refunds = Vec::with_capacity(residuals.len());
        for (order_id, owner, amount) in residuals {
            debug!(order_id, amount = %amount, "dust refunded on retired order");
            self.bus.ledger.credit(&owner, coin_out, &amount);
            refunds.push(OrderRefund {
                order_id,
                owner,
                coin: coin_out,
                amount,
            });
        }

        let paid: BigUint = payouts.iter().map(|payout| &payout.amount).sum();
        let refunded: BigUint = refunds.iter().map(|refund| &refund.amount).sum();
        self.bus.note_in(coin_in, &plan.amount_in);
        self.bus.note_out(coin_in, &paid);
        self.bus.note_out(coin_out, &plan.amount_out);
        self.bus.note_out(coin_out, &refunded);
        self.mark(handle.pair().key(), changed);

        info!(
            pair = %direction,
            trader = %trader,
            amount_in = %plan.amount_in,
            amount_out = %plan.amount_out,
            fills = plan.fills.len(),
            "swap executed"
        );
        SwapReceipt {
            trader: *trader,
            direction,
            pool_id: handle.id(),
            amount_in: plan.amount_in,
            amount_out: plan.amount_out,
            pool: delta,
            fills: plan.fills,
            payouts,
            refunds,
        }
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Validate an order and return the view it rests on
    fn validate_order(
        &self,
        owner: &Address,
        coin_buy: CoinId,
        coin_sell: CoinId,
        want_buy: &BigUint,
        want_sell: &BigUint,
    ) -> Result<PairHandle, SwapError> {
        let view = self.require_pair(coin_buy, coin_sell)?;

        let minimum = self.config.min_order_volume();
        if *want_buy < minimum || *want_sell < minimum {
            return Err(SwapError::WrongOrderVolume {
                want_buy: want_buy.clone(),
                want_sell: want_sell.clone(),
                minimum,
            });
        }

        let (reserve_buy, reserve_sell) = view.reserves();
        if reserve_buy.is_zero() || reserve_sell.is_zero() {
            return Err(SwapError::InsufficientLiquidity {
                wanted: want_sell.clone(),
                available: reserve_sell,
            });
        }

        // want_sell / want_buy must lie in [current / band, current],
        // current = reserve_sell / reserve_buy
        let band = BigUint::from(self.config.order_price_band);
        let offered = want_sell * &reserve_buy;
        let current = &reserve_sell * want_buy;
        if offered > current || &offered * &band < current {
            return Err(SwapError::WrongOrderPrice {
                price: Price::from_ratio(want_sell, want_buy),
                min: Price::from_ratio(&reserve_sell, &(&reserve_buy * &band)),
                max: Price::from_ratio(&reserve_sell, &reserve_buy),
            });
        }

        self.require_balance(owner, coin_sell, want_sell)?;
        Ok(view)
    }

    /// Validate an order without placing it
    pub fn check_order(
        &self,
        owner: &Address,
        coin_buy: CoinId,
        coin_sell: CoinId,
        want_buy: &BigUint,
        want_sell: &BigUint,
    ) -> Result<(), SwapError> {
        self.validate_order(owner, coin_buy, coin_sell, want_buy, want_sell)
            .map(|_| ())
    }

    /// Place an order selling `want_sell` of `coin_sell` for `want_buy` of
    /// `coin_buy`; the escrow is debited from `owner`.
    pub fn place_order(
        &self,
        owner: &Address,
        coin_buy: CoinId,
        coin_sell: CoinId,
        want_buy: &BigUint,
        want_sell: &BigUint,
        height: u64,
    ) -> Result<LimitOrder, SwapError> {
        let view = self.validate_order(owner, coin_buy, coin_sell, want_buy, want_sell)?;
        let key = view.pair().key();

        let snapshot = self.snapshot();
        let id = self.counters.lock().orders.allocate(snapshot.as_ref(), &keys::next_order_id());
        let order = LimitOrder::new(
            id,
            key,
            view.taker_side(),
            *owner,
            want_buy.clone(),
            want_sell.clone(),
            height,
        );
        view.pair().insert_order(order.clone());

        self.bus.ledger.debit(owner, coin_sell, want_sell);
        self.bus.note_in(coin_sell, want_sell);
        {
            let mut dirty = self.dirty.lock();
            dirty.order_pairs.insert(key);
            dirty.placed.insert(id, key);
        }

        info!(id, pair = %key, owner = %owner, want_buy = %want_buy, want_sell = %want_sell, height, "order placed");
        Ok(order)
    }

    /// Pair of an order, placed in this block or persisted
    fn order_pair(&self, id: u32) -> Option<Arc<Pair>> {
        let placed = self.dirty.lock().placed.get(&id).copied();
        let key = match placed {
            Some(key) => key,
            None => read_order(self.snapshot().as_ref(), id)?.pair,
        };
        self.load_pair(key)
    }

    /// Live order by id
    pub fn order(&self, id: u32) -> Option<LimitOrder> {
        self.order_pair(id)?.order(id)
    }

    /// Live orders of `owner`, by id.
    ///
    /// Stops early and returns what it has when `cancel` fires.
    pub fn orders_by_owner(&self, owner: &Address, cancel: &CancellationToken) -> Vec<LimitOrder> {
        let snapshot = self.snapshot();
        let mut ids: BTreeSet<u32> = self.dirty.lock().placed.keys().copied().collect();
        scan_prefix(snapshot.as_ref(), &keys::orders_prefix(), None, &mut |key, value| {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            let id = match keys::parse_order(key) {
                Some(id) => id,
                None => panic!("corrupted order key {}", hex::encode(key)),
            };
            match decode_order(id, value) {
                Some(order) if order.owner == *owner => {
                    ids.insert(id);
                }
                Some(_) => {}
                None => panic!("corrupted order record {}", id),
            }
            ControlFlow::Continue(())
        });

        let mut orders = Vec::new();
        for id in ids {
            if cancel.is_cancelled() {
                break;
            }
            match self.order(id) {
                Some(order) if order.owner == *owner => orders.push(order),
                _ => {}
            }
        }
        orders
    }

    /// The best `limit` orders a taker selling `coin0` for `coin1` consumes
    pub fn pair_orders(&self, coin0: CoinId, coin1: CoinId, limit: usize) -> Vec<LimitOrder> {
        self.pair(coin0, coin1)
            .map(|handle| handle.orders(limit))
            .unwrap_or_default()
    }

    /// Return an order's remaining escrow to its owner
    fn refund(&self, order: &LimitOrder) -> OrderRefund {
        let coin = order.coin_sell();
        if !order.want_sell.is_zero() {
            self.bus.ledger.credit(&order.owner, coin, &order.want_sell);
            self.bus.note_out(coin, &order.want_sell);
        }
        OrderRefund {
            order_id: order.id,
            owner: order.owner,
            coin,
            amount: order.want_sell.clone(),
        }
    }

    /// Cancel an order of `owner` and refund its escrow
    pub fn cancel_order(&self, owner: &Address, id: u32) -> Result<OrderRefund, SwapError> {
        let pair = self.order_pair(id).ok_or(SwapError::OrderNotFound(id))?;
        let order = pair.order(id).ok_or(SwapError::OrderNotFound(id))?;
        if order.owner != *owner {
            return Err(SwapError::OrderNotOwned { id, address: *owner });
        }
        let removed = match pair.remove_order(id) {
            Some(order) => order,
            None => panic!("order {} vanished during cancellation", id),
        };
        let refund = self.refund(&removed);
        self.mark(pair.key(), Changed::ORDERS);

        info!(id, pair = %pair.key(), refund = %refund.amount, "order cancelled");
        Ok(refund)
    }

    /// Remove every persisted order created at or below `before_height`.
    ///
    /// Walks order ids ascending and stops at the first younger order.
    /// Each removal refunds the escrow and emits an expiry event.
    pub fn expire_orders(&self, before_height: u64) -> Vec<OrderExpired> {
        let snapshot = self.snapshot();
        let mut stale = Vec::new();
        scan_prefix(snapshot.as_ref(), &keys::orders_prefix(), None, &mut |key, value| {
            let id = match keys::parse_order(key) {
                Some(id) => id,
                None => panic!("corrupted order key {}", hex::encode(key)),
            };
            let order = match decode_order(id, value) {
                Some(order) => order,
                None => panic!("corrupted order record {}", id),
            };
            if order.height > before_height {
                return ControlFlow::Break(());
            }
            stale.push((id, order.pair));
            ControlFlow::Continue(())
        });

        let mut expired = Vec::with_capacity(stale.len());
        for (id, key) in stale {
            let pair = match self.load_pair(key) {
                Some(pair) => pair,
                None => panic!("order {} references missing pair {}", id, key),
            };
            // Consumed or cancelled earlier in this block
            let Some(order) = pair.remove_order(id) else {
                continue;
            };
            let refund = self.refund(&order);
            self.mark(key, Changed::ORDERS);

            let event = OrderExpired {
                order_id: id,
                owner: order.owner,
                coin: refund.coin,
                amount: refund.amount,
            };
            self.bus.events.order_expired(event.clone());
            expired.push(event);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), before_height, "orders expired");
        }
        expired
    }

    /// Expiry sweep for the block at `height`
    pub fn expire_orders_at(&self, height: u64) -> Vec<OrderExpired> {
        match self.config.expiry_threshold(height) {
            Some(threshold) => self.expire_orders(threshold),
            None => Vec::new(),
        }
    }

    // ========================================================================
    // Import support
    // ========================================================================

    /// Record an imported order as placed in this block
    pub(crate) fn note_imported_order(&self, id: u32, key: PairKey) {
        let snapshot = self.snapshot();
        self.counters
            .lock()
            .orders
            .raise(snapshot.as_ref(), &keys::next_order_id(), id.saturating_add(1));
        let mut dirty = self.dirty.lock();
        dirty.order_pairs.insert(key);
        dirty.placed.insert(id, key);
    }

    /// Record an imported pool
    pub(crate) fn note_imported_pool(&self, key: PairKey, pool_id: u32) {
        let snapshot = self.snapshot();
        self.counters
            .lock()
            .pools
            .raise(snapshot.as_ref(), &keys::next_pool_id(), pool_id.saturating_add(1));
        self.mark(key, Changed::RESERVES);
    }

    /// Move the order counter forward to `next`
    pub(crate) fn raise_next_order_id(&self, next: u32) {
        let snapshot = self.snapshot();
        self.counters
            .lock()
            .orders
            .raise(snapshot.as_ref(), &keys::next_order_id(), next);
    }

    #[inline]
    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Flush pending state in the deterministic commit order:
    ///
    /// 1. counters that advanced (next pool id, next order id)
    /// 2. dirty pair records, descending canonical key bytes
    /// 3. dirty order books, descending canonical key bytes, each ascending
    ///    by order id
    ///
    /// Order caches are truncated afterwards. Follow with
    /// [`Swap::set_snapshot`] once the store sealed the version.
    ///
    /// On error the counters and the pair records stay dirty, so a retry
    /// against a fresh writer rewrites them.
    pub fn commit(&self, writer: &mut dyn StoreWriter) -> Result<(), StoreError> {
        {
            let counters = self.counters.lock();
            counters.pools.write(writer, &keys::next_pool_id())?;
            counters.orders.write(writer, &keys::next_order_id())?;
        }

        let (pairs, order_pairs) = {
            let dirty = self.dirty.lock();
            (commit_order(&dirty.pairs), commit_order(&dirty.order_pairs))
        };
        for key in &pairs {
            self.materialized(*key).commit_reserves(writer)?;
        }
        for key in &order_pairs {
            self.materialized(*key)
                .commit_orders(writer, self.config.cache_retain)?;
        }

        {
            let mut counters = self.counters.lock();
            counters.pools.mark_clean();
            counters.orders.mark_clean();
        }
        {
            let mut dirty = self.dirty.lock();
            dirty.pairs.clear();
            dirty.order_pairs.clear();
        }
        info!(pairs = pairs.len(), order_pairs = order_pairs.len(), "swap state committed");
        Ok(())
    }

    fn materialized(&self, key: PairKey) -> Arc<Pair> {
        match self.pairs.read().get(&key) {
            Some(Some(pair)) => pair.clone(),
            _ => panic!("dirty pair {} is not materialized", key),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BalanceLedger, MemoryBus};
    use crate::store::MemoryTree;
    use crate::types::Side;
    use num_bigint::BigInt;

    fn e18(v: u64) -> BigUint {
        BigUint::from(v) * BigUint::from(10u32).pow(18)
    }

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    const A: CoinId = CoinId(1);
    const B: CoinId = CoinId(2);

    struct Fixture {
        tree: MemoryTree,
        bus: MemoryBus,
        swap: Swap,
    }

    impl Fixture {
        fn new() -> Self {
            let tree = MemoryTree::new();
            let bus = MemoryBus::new();
            let swap = Swap::new(tree.latest(), bus.bus(), EngineConfig::default());
            Self { tree, bus, swap }
        }

        fn fund(&self, owner: &Address, coin: CoinId, amount: BigUint) {
            self.bus.ledger.credit(owner, coin, &amount);
        }

        fn pool(&self, reserve_a: u64, reserve_b: u64) {
            let provider = addr(1);
            self.fund(&provider, A, e18(reserve_a));
            self.fund(&provider, B, e18(reserve_b));
            self.swap
                .create_pool(&provider, A, B, &e18(reserve_a), &e18(reserve_b))
                .unwrap();
        }

        fn commit(&mut self) {
            self.swap.commit(&mut self.tree).unwrap();
            self.swap.set_snapshot(self.tree.commit_version());
        }
    }

    #[test]
    fn test_create_pool_validation() {
        let fx = Fixture::new();
        let provider = addr(1);
        assert_eq!(
            fx.swap.create_pool(&provider, A, A, &e18(1), &e18(1)),
            Err(SwapError::IdenticalCoins(A))
        );
        assert!(matches!(
            fx.swap.create_pool(&provider, A, B, &e18(1), &e18(1)),
            Err(SwapError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            fx.swap.check_create(&provider, A, B, &BigUint::from(10u32), &BigUint::from(10u32)),
            Err(SwapError::InsufficientLiquidityMinted { .. })
        ));

        fx.pool(10, 20);
        assert_eq!(
            fx.swap.create_pool(&provider, B, A, &e18(1), &e18(1)),
            Err(SwapError::PairExists(PairKey::new(1, 2)))
        );
        assert_eq!(fx.swap.pair(B, A).unwrap().reserves(), (e18(20), e18(10)));
        assert_eq!(fx.bus.checker.net(A), BigInt::from(e18(10)));
    }

    #[test]
    fn test_pool_ids_survive_commit() {
        let mut fx = Fixture::new();
        fx.pool(10, 10);
        fx.commit();
        assert_eq!(fx.swap.next_pool_id(), 2);

        let restarted = Swap::new(fx.tree.latest(), fx.bus.bus(), EngineConfig::default());
        assert_eq!(restarted.next_pool_id(), 2);
        assert_eq!(restarted.pair(A, B).unwrap().id(), 1);
    }

    #[test]
    fn test_liquidity_round_trip() {
        let fx = Fixture::new();
        fx.pool(100, 200);
        let provider = addr(5);
        fx.fund(&provider, B, e18(20));
        fx.fund(&provider, A, e18(10));

        // Reversed orientation: coin_a = B
        let quote = fx
            .swap
            .add_liquidity(&provider, B, A, &e18(20), &e18(10), &e18(100))
            .unwrap();
        assert_eq!(quote.amount1, e18(10));
        assert_eq!(quote.liquidity, e18(10));
        assert_eq!(fx.bus.ledger.balance(&provider, A), BigUint::zero());

        let (got_b, got_a) = fx
            .swap
            .remove_liquidity(&provider, B, A, &e18(10), &e18(1), &e18(1), &e18(110))
            .unwrap();
        assert_eq!(got_a, e18(10));
        assert_eq!(got_b, e18(20));
        assert_eq!(fx.swap.pair(A, B).unwrap().reserves(), (e18(100), e18(200)));
    }

    #[test]
    fn test_order_price_band() {
        let fx = Fixture::new();
        fx.pool(10_000, 10_000);
        let maker = addr(7);
        fx.fund(&maker, B, e18(10_000));

        // Crosses the curve: offers more B per A than the pool
        assert!(matches!(
            fx.swap.check_order(&maker, A, B, &e18(100), &e18(101)),
            Err(SwapError::WrongOrderPrice { .. })
        ));
        // Worse than five times the curve price
        assert!(matches!(
            fx.swap.check_order(&maker, A, B, &e18(600), &e18(100)),
            Err(SwapError::WrongOrderPrice { .. })
        ));
        assert!(matches!(
            fx.swap.check_order(&maker, A, B, &BigUint::from(5u32), &BigUint::from(5u32)),
            Err(SwapError::WrongOrderVolume { .. })
        ));
        assert!(fx.swap.check_order(&maker, A, B, &e18(500), &e18(100)).is_ok());
        assert!(fx.swap.check_order(&maker, A, B, &e18(100), &e18(100)).is_ok());
    }

    #[test]
    fn test_place_and_cancel_order() {
        let fx = Fixture::new();
        fx.pool(10_000, 10_000);
        let maker = addr(7);
        fx.fund(&maker, B, e18(5_000));

        let order = fx
            .swap
            .place_order(&maker, A, B, &e18(15_000), &e18(5_000), 3)
            .unwrap();
        assert_eq!(order.side, Side::Sell);
        assert_eq!(fx.bus.ledger.balance(&maker, B), BigUint::zero());
        assert_eq!(fx.swap.order(order.id).unwrap(), order);
        assert_eq!(fx.swap.pair_orders(A, B, 10), vec![order.clone()]);
        assert!(fx.swap.pair_orders(B, A, 10).is_empty());

        assert_eq!(
            fx.swap.cancel_order(&addr(8), order.id),
            Err(SwapError::OrderNotOwned { id: order.id, address: addr(8) })
        );
        let refund = fx.swap.cancel_order(&maker, order.id).unwrap();
        assert_eq!(refund.amount, e18(5_000));
        assert_eq!(fx.bus.ledger.balance(&maker, B), e18(5_000));
        assert!(fx.swap.order(order.id).is_none());
        assert_eq!(fx.swap.cancel_order(&maker, order.id), Err(SwapError::OrderNotFound(order.id)));
    }

    #[test]
    fn test_swap_pays_maker_and_balances_checker() {
        let fx = Fixture::new();
        fx.pool(10_000, 10_000);
        let maker = addr(7);
        fx.fund(&maker, B, e18(5_000));
        fx.swap
            .place_order(&maker, A, B, &e18(15_000), &e18(5_000), 3)
            .unwrap();

        let trader = addr(9);
        let receipt = fx
            .swap
            .sell_with_orders(&trader, A, B, &e18(10_000), &BigUint::zero())
            .unwrap();
        assert_eq!(receipt.fills.len(), 1);
        assert_eq!(fx.bus.ledger.balance(&maker, A), receipt.total_payout());
        assert!(receipt.total_payout() > BigUint::zero());

        // Engine holdings = initial reserves + escrow + taker flows
        let net_a = BigInt::from(e18(10_000)) + BigInt::from(receipt.amount_in.clone())
            - BigInt::from(receipt.total_payout());
        assert_eq!(fx.bus.checker.net(A), net_a);
        let net_b = BigInt::from(e18(15_000)) - BigInt::from(receipt.amount_out.clone());
        assert_eq!(fx.bus.checker.net(B), net_b);
    }

    #[test]
    fn test_swap_errors() {
        let fx = Fixture::new();
        fx.pool(10, 10);
        let trader = addr(9);
        assert_eq!(
            fx.swap.sell_with_orders(&trader, A, CoinId(3), &e18(1), &BigUint::zero()),
            Err(SwapError::PairNotExists(PairKey::new(1, 3)))
        );
        assert!(matches!(
            fx.swap.buy_with_orders(&trader, A, B, &e18(10), &e18(1_000)),
            Err(SwapError::InsufficientLiquidity { .. })
        ));
        assert!(matches!(
            fx.swap.check_sell(A, B, &e18(1), &e18(1)),
            Err(SwapError::MinimumOutput { .. })
        ));
        assert!(fx.swap.check_buy(A, B, &e18(1), &e18(2)).is_ok());
    }

    #[test]
    #[should_panic(expected = "sell of zero")]
    fn test_zero_sell_panics() {
        let fx = Fixture::new();
        fx.pool(10, 10);
        let _ = fx.swap.sell_with_orders(&addr(9), A, B, &BigUint::zero(), &BigUint::zero());
    }

    #[test]
    fn test_pools_enumeration_and_cancel() {
        let mut fx = Fixture::new();
        fx.pool(10, 10);
        fx.commit();
        let provider = addr(1);
        fx.fund(&provider, CoinId(3), e18(10));
        fx.fund(&provider, A, e18(10));
        fx.swap.create_pool(&provider, CoinId(3), A, &e18(10), &e18(10)).unwrap();

        let pools = fx.swap.pools(&CancellationToken::new());
        let keys: Vec<PairKey> = pools.iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec![PairKey::new(1, 2), PairKey::new(1, 3)]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(fx.swap.pools(&cancel).is_empty());
    }

    #[test]
    fn test_commit_is_idempotent_when_clean() {
        let mut fx = Fixture::new();
        fx.pool(10, 10);
        fx.commit();
        fx.swap.commit(&mut fx.tree).unwrap();
        assert_eq!(fx.tree.pending_writes(), 0);
    }

    #[test]
    fn test_failed_commit_keeps_counters_dirty() {
        let mut fx = Fixture::new();
        let provider = addr(1);
        // Reserves one past the largest persistable word
        let huge = BigUint::from(1u32) << 256u32;
        fx.fund(&provider, A, huge.clone());
        fx.fund(&provider, B, huge.clone());
        let created = fx.swap.create_pool(&provider, A, B, &huge, &huge).unwrap();

        // The failed attempt's writer is discarded along with its partial writes
        let mut scratch = MemoryTree::new();
        assert!(matches!(
            fx.swap.commit(&mut scratch),
            Err(StoreError::AmountOverflow { .. })
        ));

        let supply = created.liquidity;
        let half = &supply / 2u32;
        fx.swap
            .remove_liquidity(&provider, A, B, &half, &BigUint::zero(), &BigUint::zero(), &supply)
            .unwrap();
        fx.commit();

        let restarted = Swap::new(fx.tree.latest(), fx.bus.bus(), EngineConfig::default());
        assert_eq!(restarted.next_pool_id(), 2);
        assert_eq!(restarted.pair(A, B).unwrap().id(), 1);
    }

    #[test]
    fn test_reset_snapshot_discards_uncommitted() {
        let mut fx = Fixture::new();
        fx.pool(10, 10);
        fx.commit();
        let trader = addr(9);
        fx.swap
            .sell_with_orders(&trader, A, B, &e18(1), &BigUint::zero())
            .unwrap();
        assert_ne!(fx.swap.pair(A, B).unwrap().reserves(), (e18(10), e18(10)));

        fx.swap.reset_snapshot(fx.tree.latest());
        assert_eq!(fx.swap.pair(A, B).unwrap().reserves(), (e18(10), e18(10)));
    }
}
