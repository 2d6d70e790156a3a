//! Trading pairs and their directional views.
//!
//! ## Architecture
//!
//! A [`Pair`] is shared as `Arc<Pair>` between the registry and every handle
//! given out. It carries two independent locks:
//!
//! - **Reserves**: `RwLock<PairData>`, held only for the duration of a read
//!   or an update, so readers always see both reserves of one update
//! - **Order book**: `Mutex<OrderBook>`, held across lazy loading and walks
//!
//! Every mutation takes the book lock first and the reserve lock second.
//! Readers of reserves never wait for a walk.
//!
//! ## Views
//!
//! - [`PairHandle`]: the shared pair plus a `reversed` flag; all amounts it
//!   takes and returns are in the view's orientation
//! - [`SteppedPair`]: a handle with a hypothetical curve step folded in;
//!   probing it never touches stored reserves

use std::fmt;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::amm::liquidity::{burn_quote, mint_quote};
use crate::amm::{Curve, MintQuote};
use crate::engine::{apply_delta, buy_exact_out, sell_exact_in, BookCursor, MatchPlan};
use crate::error::{StoreError, SwapError};
use crate::orderbook::{FillEffect, OrderBook};
use crate::store::records::encode_pair;
use crate::store::{keys, Snapshot, StoreWriter};
use crate::types::{Address, CoinId, LimitOrder, PairKey, PoolDelta, Price, Side};

/// Snapshot reference shared by the registry and its pairs
pub(crate) type SharedSnapshot = Arc<RwLock<Arc<dyn Snapshot>>>;

/// Reserves and pool id of a pair, canonical orientation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairData {
    pub reserve0: BigUint,
    pub reserve1: BigUint,
    pub id: u32,
}

impl PairData {
    fn curve(&self, reversed: bool) -> Curve {
        if reversed {
            Curve::new(self.reserve1.clone(), self.reserve0.clone())
        } else {
            Curve::new(self.reserve0.clone(), self.reserve1.clone())
        }
    }

    fn set_curve(&mut self, reversed: bool, curve: &Curve) {
        let (reserve_in, reserve_out) = (curve.reserve_in().clone(), curve.reserve_out().clone());
        if reversed {
            self.reserve0 = reserve_out;
            self.reserve1 = reserve_in;
        } else {
            self.reserve0 = reserve_in;
            self.reserve1 = reserve_out;
        }
    }
}

/// What a mutation touched, consumed by the registry's dirty sets
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changed {
    pub reserves: bool,
    pub orders: bool,
}

impl Changed {
    pub const RESERVES: Changed = Changed {
        reserves: true,
        orders: false,
    };
    pub const ORDERS: Changed = Changed {
        reserves: false,
        orders: true,
    };
}

/// Swap request in the direction of a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Trade {
    /// Sell exactly `amount_in`, receiving at least `min_amount_out`
    ExactIn { amount_in: BigUint, min_amount_out: BigUint },
    /// Buy exactly `amount_out`, paying at most `max_amount_in`
    ExactOut { amount_out: BigUint, max_amount_in: BigUint },
}

/// An applied swap
#[derive(Debug)]
pub(crate) struct Execution {
    pub plan: MatchPlan,
    pub delta: PoolDelta,
    /// Orders retired with escrow left: `(id, owner, residual)`
    pub residuals: Vec<(u32, Address, BigUint)>,
    pub changed: Changed,
}

/// Side consumed by a taker selling the view's `coin0`
#[inline]
fn taker_side(reversed: bool) -> Side {
    Side::selling_view_coin1(!reversed)
}

// ============================================================================
// Pair
// ============================================================================

/// A pool and its order book.
pub struct Pair {
    key: PairKey,
    data: RwLock<PairData>,
    book: Mutex<OrderBook>,
    snapshot: SharedSnapshot,
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pair")
            .field("key", &self.key)
            .field("data", &*self.data.read())
            .finish_non_exhaustive()
    }
}

impl Pair {
    pub(crate) fn new(key: PairKey, data: PairData, load_batch: usize, snapshot: SharedSnapshot) -> Self {
        debug_assert!(key.is_sorted());
        Self {
            key,
            data: RwLock::new(data),
            book: Mutex::new(OrderBook::new(key, load_batch)),
            snapshot,
        }
    }

    /// Canonical key
    #[inline]
    pub fn key(&self) -> PairKey {
        self.key
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.data.read().id
    }

    /// Consistent copy of reserves and id
    pub fn data(&self) -> PairData {
        self.data.read().clone()
    }

    /// `(reserve0, reserve1)` from one update
    pub fn reserves(&self) -> (BigUint, BigUint) {
        let data = self.data.read();
        (data.reserve0.clone(), data.reserve1.clone())
    }

    fn snapshot(&self) -> Arc<dyn Snapshot> {
        self.snapshot.read().clone()
    }

    fn curve(&self, reversed: bool) -> Curve {
        self.data.read().curve(reversed)
    }

    /// Run a walk against the book without changing anything.
    fn simulate<F>(&self, reversed: bool, curve: Option<&Curve>, walk: F) -> Option<MatchPlan>
    where
        F: for<'a> FnOnce(&Curve, BookCursor<'a>) -> Option<MatchPlan>,
    {
        let snapshot = self.snapshot();
        let mut book = self.book.lock();
        let curve = match curve {
            Some(curve) => curve.clone(),
            None => self.curve(reversed),
        };
        walk(&curve, BookCursor::new(&mut book, snapshot.as_ref(), taker_side(reversed)))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Match and apply a swap in the direction of a view.
    ///
    /// Slippage limits are checked before anything changes.
    ///
    /// # Errors
    ///
    /// * [`SwapError::InsufficientOutputAmount`] - exact input yields nothing
    /// * [`SwapError::InsufficientLiquidity`] - exact output exceeds the pool
    /// * [`SwapError::MinimumOutput`] / [`SwapError::MaximumInput`] - slippage
    ///
    /// # Panics
    ///
    /// Panics if settlement would shrink the reserve product.
    pub(crate) fn execute(&self, reversed: bool, trade: &Trade) -> Result<Execution, SwapError> {
        let snapshot = self.snapshot();
        let mut book = self.book.lock();
        let side = taker_side(reversed);
        let start = self.curve(reversed);

        let plan = match trade {
            Trade::ExactIn {
                amount_in,
                min_amount_out,
            } => {
                let cursor = BookCursor::new(&mut book, snapshot.as_ref(), side);
                let plan = sell_exact_in(&start, cursor, amount_in).ok_or(SwapError::InsufficientOutputAmount)?;
                if plan.amount_out < *min_amount_out {
                    return Err(SwapError::MinimumOutput {
                        amount_out: plan.amount_out,
                        minimum: min_amount_out.clone(),
                    });
                }
                plan
            }
            Trade::ExactOut {
                amount_out,
                max_amount_in,
            } => {
                let cursor = BookCursor::new(&mut book, snapshot.as_ref(), side);
                let plan = buy_exact_out(&start, cursor, amount_out).ok_or_else(|| SwapError::InsufficientLiquidity {
                    wanted: amount_out.clone(),
                    available: start.reserve_out().clone(),
                })?;
                if plan.amount_in > *max_amount_in {
                    return Err(SwapError::MaximumInput {
                        amount_in: plan.amount_in,
                        maximum: max_amount_in.clone(),
                    });
                }
                plan
            }
        };

        let delta = plan.pool_delta();
        let settled = apply_delta(&start, &delta);
        assert!(
            settled.reserve_in() * settled.reserve_out() >= start.reserve_in() * start.reserve_out(),
            "swap on {} shrinks the reserve product",
            self.key
        );
        self.data.write().set_curve(reversed, &settled);

        let mut residuals = Vec::new();
        for fill in &plan.fills {
            if let FillEffect::Retired { residual } = book.apply_fill(side, fill.order_id, &fill.bought, &fill.sold) {
                if !residual.is_zero() {
                    residuals.push((fill.order_id, fill.owner, residual));
                }
            }
        }

        debug!(
            pair = %self.key,
            reversed,
            amount_in = %plan.amount_in,
            amount_out = %plan.amount_out,
            fills = plan.fills.len(),
            "swap applied"
        );
        let changed = Changed {
            reserves: true,
            orders: !plan.fills.is_empty(),
        };
        Ok(Execution {
            plan,
            delta,
            residuals,
            changed,
        })
    }

    /// Quote a proportional add without applying it
    pub(crate) fn quote_mint(
        &self,
        reversed: bool,
        amount0: &BigUint,
        max_amount1: &BigUint,
        total_supply: &BigUint,
    ) -> Result<MintQuote, SwapError> {
        let curve = self.curve(reversed);
        mint_quote((curve.reserve_in(), curve.reserve_out()), amount0, max_amount1, total_supply)
    }

    /// Add liquidity in the direction of a view.
    ///
    /// `admit` sees the quote under the lock and may still reject it.
    pub(crate) fn mint<F>(
        &self,
        reversed: bool,
        amount0: &BigUint,
        max_amount1: &BigUint,
        total_supply: &BigUint,
        admit: F,
    ) -> Result<MintQuote, SwapError>
    where
        F: FnOnce(&MintQuote) -> Result<(), SwapError>,
    {
        let _book = self.book.lock();
        let mut data = self.data.write();
        let curve = data.curve(reversed);
        let quote = mint_quote((curve.reserve_in(), curve.reserve_out()), amount0, max_amount1, total_supply)?;
        admit(&quote)?;
        data.set_curve(reversed, &curve.after_deposit(&quote.amount0, &quote.amount1));
        Ok(quote)
    }

    /// Quote a withdrawal without applying it
    pub(crate) fn quote_burn(
        &self,
        reversed: bool,
        liquidity: &BigUint,
        minimums: (&BigUint, &BigUint),
        total_supply: &BigUint,
    ) -> Result<(BigUint, BigUint), SwapError> {
        let curve = self.curve(reversed);
        burn_quote((curve.reserve_in(), curve.reserve_out()), liquidity, minimums, total_supply)
    }

    /// Withdraw liquidity in the direction of a view
    pub(crate) fn burn(
        &self,
        reversed: bool,
        liquidity: &BigUint,
        minimums: (&BigUint, &BigUint),
        total_supply: &BigUint,
    ) -> Result<(BigUint, BigUint), SwapError> {
        let _book = self.book.lock();
        let mut data = self.data.write();
        let curve = data.curve(reversed);
        let (amount0, amount1) = burn_quote((curve.reserve_in(), curve.reserve_out()), liquidity, minimums, total_supply)?;
        let withdrawn = Curve::new(curve.reserve_in() - &amount0, curve.reserve_out() - &amount1);
        data.set_curve(reversed, &withdrawn);
        Ok((amount0, amount1))
    }

    pub(crate) fn insert_order(&self, order: LimitOrder) {
        self.book.lock().insert(order);
    }

    pub(crate) fn remove_order(&self, id: u32) -> Option<LimitOrder> {
        let snapshot = self.snapshot();
        self.book.lock().remove(snapshot.as_ref(), id)
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Live order of this pair by id
    pub fn order(&self, id: u32) -> Option<LimitOrder> {
        let snapshot = self.snapshot();
        self.book.lock().order(snapshot.as_ref(), id).cloned()
    }

    /// Order at `index` of a side, best first
    pub fn order_at(&self, side: Side, index: usize) -> Option<LimitOrder> {
        let snapshot = self.snapshot();
        self.book.lock().order_at(snapshot.as_ref(), side, index).cloned()
    }

    /// The best `limit` orders of a side
    pub fn orders(&self, side: Side, limit: usize) -> Vec<LimitOrder> {
        let snapshot = self.snapshot();
        self.book.lock().top(snapshot.as_ref(), side, limit)
    }

    /// Every live order of a side, best first
    pub fn all_orders(&self, side: Side) -> Vec<LimitOrder> {
        let snapshot = self.snapshot();
        let mut book = self.book.lock();
        book.load_all(snapshot.as_ref(), side);
        let len = book.side(side).len();
        book.top(snapshot.as_ref(), side, len)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub(crate) fn commit_reserves(&self, writer: &mut dyn StoreWriter) -> Result<(), StoreError> {
        let data = self.data.read();
        writer.set(&keys::pair(&self.key), &encode_pair(&data.reserve0, &data.reserve1, data.id)?);
        Ok(())
    }

    pub(crate) fn commit_orders(&self, writer: &mut dyn StoreWriter, retain: usize) -> Result<(), StoreError> {
        self.book.lock().commit(writer, retain)
    }
}

// ============================================================================
// Directional views
// ============================================================================

/// A pair seen from one trading direction.
///
/// All reserves and amounts are in the view's orientation: the taker sells
/// `coin0` and receives `coin1`. Mutations through a reversed view are the
/// same mutations on the shared pair.
#[derive(Clone)]
pub struct PairHandle {
    pair: Arc<Pair>,
    reversed: bool,
}

impl fmt::Debug for PairHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairHandle")
            .field("key", &self.key())
            .field("reversed", &self.reversed)
            .finish()
    }
}

impl PairHandle {
    pub(crate) fn new(pair: Arc<Pair>, reversed: bool) -> Self {
        Self { pair, reversed }
    }

    /// Shared pair behind the view
    #[inline]
    pub fn pair(&self) -> &Arc<Pair> {
        &self.pair
    }

    #[inline]
    pub(crate) fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Directional key
    pub fn key(&self) -> PairKey {
        if self.reversed {
            self.pair.key().reversed()
        } else {
            self.pair.key()
        }
    }

    #[inline]
    pub fn coin0(&self) -> CoinId {
        self.key().coin0
    }

    #[inline]
    pub fn coin1(&self) -> CoinId {
        self.key().coin1
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.pair.id()
    }

    /// The same pair seen from the other direction
    pub fn reverse(&self) -> Self {
        Self::new(self.pair.clone(), !self.reversed)
    }

    /// `(reserve0, reserve1)` of the view from one update
    pub fn reserves(&self) -> (BigUint, BigUint) {
        let (reserve0, reserve1) = self.pair.reserves();
        if self.reversed {
            (reserve1, reserve0)
        } else {
            (reserve0, reserve1)
        }
    }

    /// Current curve of the view
    pub fn curve(&self) -> Curve {
        self.pair.curve(self.reversed)
    }

    /// Curve price in order terms: `reserve0 / reserve1`, coin0 paid per
    /// coin1 received; see [`Curve::sort_price`]
    pub fn sort_price(&self) -> Price {
        self.curve().sort_price()
    }

    /// True when the pool holds no liquidity
    pub fn is_empty(&self) -> bool {
        self.curve().is_empty()
    }

    /// Side whose orders a taker of this view consumes, and where orders
    /// placed to sell `coin1` rest
    #[inline]
    pub fn taker_side(&self) -> Side {
        taker_side(self.reversed)
    }

    // ========================================================================
    // Curve-only simulation
    // ========================================================================

    /// Curve output for selling `amount_in` of `coin0`
    pub fn calculate_buy_for_sell(&self, amount_in: &BigUint) -> Option<BigUint> {
        self.curve().amount_out(amount_in)
    }

    /// Curve input required to receive `amount_out` of `coin1`
    pub fn calculate_sell_for_buy(&self, amount_out: &BigUint) -> Option<BigUint> {
        self.curve().amount_in(amount_out)
    }

    /// Validate a curve trade against the current reserves
    pub fn check_swap(&self, amount_in: &BigUint, amount_out: &BigUint) -> Result<(), SwapError> {
        self.curve().check_swap(amount_in, amount_out)
    }

    /// Hypothetical view with a curve trade folded in.
    ///
    /// # Panics
    ///
    /// Panics if `amount_out` exceeds the output reserve.
    pub fn add_last_swap_step(&self, amount_in: &BigUint, amount_out: &BigUint) -> SteppedPair {
        SteppedPair {
            handle: self.clone(),
            curve: self.curve().after_swap(amount_in, amount_out),
        }
    }

    // ========================================================================
    // Order-aware simulation
    // ========================================================================

    /// Full plan for selling exactly `amount_in`
    pub fn plan_sell(&self, amount_in: &BigUint) -> Option<MatchPlan> {
        self.pair
            .simulate(self.reversed, None, |curve, orders| sell_exact_in(curve, orders, amount_in))
    }

    /// Full plan for buying exactly `amount_out`
    pub fn plan_buy(&self, amount_out: &BigUint) -> Option<MatchPlan> {
        self.pair
            .simulate(self.reversed, None, |curve, orders| buy_exact_out(curve, orders, amount_out))
    }

    /// Output for selling `amount_in` across the curve and the book
    pub fn calculate_buy_for_sell_with_orders(&self, amount_in: &BigUint) -> Option<BigUint> {
        self.plan_sell(amount_in).map(|plan| plan.amount_out)
    }

    /// Input required to receive `amount_out` across the curve and the book
    pub fn calculate_sell_for_buy_with_orders(&self, amount_out: &BigUint) -> Option<BigUint> {
        self.plan_buy(amount_out).map(|plan| plan.amount_in)
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Order at `index` of the side a taker consumes, best first
    pub fn order_at(&self, index: usize) -> Option<LimitOrder> {
        self.pair.order_at(self.taker_side(), index)
    }

    /// The best `limit` orders a taker would consume
    pub fn orders(&self, limit: usize) -> Vec<LimitOrder> {
        self.pair.orders(self.taker_side(), limit)
    }
}

/// A view with hypothetical curve steps applied.
///
/// Simulations run against the stepped curve and the pair's real book.
#[derive(Debug, Clone)]
pub struct SteppedPair {
    handle: PairHandle,
    curve: Curve,
}

impl SteppedPair {
    /// The stepped curve
    #[inline]
    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    /// The view the steps were taken on
    #[inline]
    pub fn handle(&self) -> &PairHandle {
        &self.handle
    }

    /// `(reserve0, reserve1)` after the steps
    pub fn reserves(&self) -> (BigUint, BigUint) {
        (self.curve.reserve_in().clone(), self.curve.reserve_out().clone())
    }

    /// Stepped curve price in order terms; see [`Curve::sort_price`]
    pub fn sort_price(&self) -> Price {
        self.curve.sort_price()
    }

    /// Same steps seen from the other direction
    pub fn reverse(&self) -> Self {
        Self {
            handle: self.handle.reverse(),
            curve: self.curve.reversed(),
        }
    }

    /// Chain another step
    pub fn add_last_swap_step(&self, amount_in: &BigUint, amount_out: &BigUint) -> Self {
        Self {
            handle: self.handle.clone(),
            curve: self.curve.after_swap(amount_in, amount_out),
        }
    }

    pub fn calculate_buy_for_sell(&self, amount_in: &BigUint) -> Option<BigUint> {
        self.curve.amount_out(amount_in)
    }

    pub fn calculate_sell_for_buy(&self, amount_out: &BigUint) -> Option<BigUint> {
        self.curve.amount_in(amount_out)
    }

    pub fn check_swap(&self, amount_in: &BigUint, amount_out: &BigUint) -> Result<(), SwapError> {
        self.curve.check_swap(amount_in, amount_out)
    }

    pub fn calculate_buy_for_sell_with_orders(&self, amount_in: &BigUint) -> Option<BigUint> {
        self.handle
            .pair
            .simulate(self.handle.reversed, Some(&self.curve), |curve, orders| {
                sell_exact_in(curve, orders, amount_in)
            })
            .map(|plan| plan.amount_out)
    }

    pub fn calculate_sell_for_buy_with_orders(&self, amount_out: &BigUint) -> Option<BigUint> {
        self.handle
            .pair
            .simulate(self.handle.reversed, Some(&self.curve), |curve, orders| {
                buy_exact_out(curve, orders, amount_out)
            })
            .map(|plan| plan.amount_in)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
