//! Order-aware swap walks.
//!
//! ## Walk
//!
//! A swap in one direction consumes the curve and the orders resting on the
//! side that sells the taker's output coin, best price first. For each order:
//!
//! 1. If the order is priced worse than the curve, trade the curve down to
//!    the order's price first (a hypothetical [`Curve`] step)
//! 2. If the remaining amount runs out during that step, stop; the rest goes
//!    to the curve
//! 3. Otherwise fill the order, partially or fully; a full fill deposits
//!    both legs' commissions into the hypothetical curve
//!
//! Whatever is left after the last order trades on the curve.
//!
//! ## Settlement
//!
//! A [`MatchPlan`] lists the fills and the taker's totals. [`MatchPlan::pool_delta`]
//! derives what the pool itself traded: the taker totals minus everything
//! the orders absorbed, plus the commissions of every fill.

use std::cmp::Ordering;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use tracing::trace;

use crate::amm::fee::{fee_from_gross, fee_on_net, net_of_fee};
use crate::amm::Curve;
use crate::orderbook::{OrderBook, SortKey};
use crate::store::Snapshot;
use crate::types::amount::ceil_div;
use crate::types::{Address, LimitOrder, OrderFill, PoolDelta, Side};

// ============================================================================
// Order quotes
// ============================================================================

/// Remaining volumes of a resting order, seen from the taker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuote {
    pub id: u32,
    pub owner: Address,
    /// Taker's input coin the order still wants (its `want_buy`)
    pub want: BigUint,
    /// Taker's output coin the order still offers (its `want_sell`)
    pub offer: BigUint,
}

impl OrderQuote {
    pub fn new(id: u32, owner: Address, want: BigUint, offer: BigUint) -> Self {
        Self { id, owner, want, offer }
    }
}

impl From<&LimitOrder> for OrderQuote {
    fn from(order: &LimitOrder) -> Self {
        Self::new(order.id, order.owner, order.want_buy.clone(), order.want_sell.clone())
    }
}

/// Walks one side of a pair's book, loading from the snapshot as needed.
///
/// The cursor remembers the last key it returned, so the book may load
/// further batches between calls without disturbing the walk.
pub struct BookCursor<'a> {
    book: &'a mut OrderBook,
    snapshot: &'a dyn Snapshot,
    side: Side,
    last: Option<SortKey>,
}

impl<'a> BookCursor<'a> {
    pub fn new(book: &'a mut OrderBook, snapshot: &'a dyn Snapshot, side: Side) -> Self {
        Self {
            book,
            snapshot,
            side,
            last: None,
        }
    }
}

impl Iterator for BookCursor<'_> {
    type Item = OrderQuote;

    fn next(&mut self) -> Option<OrderQuote> {
        let key = self.book.next_after(self.snapshot, self.side, self.last)?;
        self.last = Some(key);
        match self.book.cached_order(key.id) {
            Some(order) => Some(OrderQuote::from(order)),
            None => panic!("book index of {} lists unmaterialized order {}", self.book.pair(), key.id),
        }
    }
}

// ============================================================================
// Match plan
// ============================================================================

/// Outcome of a walk, before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    /// Gross amount the taker pays
    pub amount_in: BigUint,

    /// Amount the taker receives
    pub amount_out: BigUint,

    /// Orders matched, in walk order
    pub fills: Vec<OrderFill>,

    /// Hypothetical curve at the end of the walk
    pub curve: Curve,
}

impl MatchPlan {
    fn new(curve: Curve) -> Self {
        Self {
            amount_in: BigUint::zero(),
            amount_out: BigUint::zero(),
            fills: Vec::new(),
            curve,
        }
    }

    /// True when no order was matched
    #[inline]
    pub fn is_curve_only(&self) -> bool {
        self.fills.is_empty()
    }

    /// What the pool traded, net of the orders.
    ///
    /// ```text
    /// pool_in        = amount_in  - sum(bought)
    /// pool_out       = amount_out - sum(sold - fee_from_gross(sold))
    /// commission_in  = sum(fee_from_gross(bought))
    /// commission_out = sum(fee_from_gross(sold))
    /// ```
    pub fn pool_delta(&self) -> PoolDelta {
        let mut bought = BigUint::zero();
        let mut proceeds = BigUint::zero();
        let mut commission_in = BigUint::zero();
        let mut commission_out = BigUint::zero();
        for fill in &self.fills {
            bought += &fill.bought;
            proceeds += fill.taker_proceeds();
            commission_in += fill.maker_commission();
            commission_out += fill.taker_commission();
        }
        PoolDelta {
            pool_in: BigInt::from(self.amount_in.clone()) - BigInt::from(bought),
            pool_out: BigInt::from(self.amount_out.clone()) - BigInt::from(proceeds),
            commission_in,
            commission_out,
        }
    }
}

/// Reserves after settling `delta` onto `curve`.
///
/// # Panics
///
/// Panics if the delta would drive a reserve negative.
pub fn apply_delta(curve: &Curve, delta: &PoolDelta) -> Curve {
    let reserve_in = BigInt::from(curve.reserve_in().clone()) + &delta.pool_in + BigInt::from(delta.commission_in.clone());
    let reserve_out = BigInt::from(curve.reserve_out().clone()) - &delta.pool_out + BigInt::from(delta.commission_out.clone());
    match (reserve_in.to_biguint(), reserve_out.to_biguint()) {
        (Some(reserve_in), Some(reserve_out)) => Curve::new(reserve_in, reserve_out),
        _ => panic!("settlement leaves negative reserves ({}, {})", reserve_in, reserve_out),
    }
}

/// Apply one hypothetical curve step, validating it first.
///
/// # Panics
///
/// Panics if the step violates the product invariant; the walk only
/// produces steps computed from the same curve.
fn step(curve: &Curve, amount_in: &BigUint, amount_out: &BigUint) -> Curve {
    if let Err(err) = curve.check_swap(amount_in, amount_out) {
        panic!("walk produced an invalid curve step {} -> {}: {}", amount_in, amount_out, err);
    }
    curve.after_swap(amount_in, amount_out)
}

/// Curve input that moves the price down to the order's price, with its output.
fn step_to_order(curve: &Curve, order: &OrderQuote) -> Option<(BigUint, BigUint)> {
    if curve.cmp_price(&order.offer, &order.want) != Ordering::Less {
        return None;
    }
    let x = curve.amount_in_for_price(&order.offer, &order.want)?;
    let y = curve.amount_out(&x)?;
    Some((x, y))
}

// ============================================================================
// Walks
// ============================================================================

/// Sell exactly `amount_in` across the curve and `orders`.
///
/// # Arguments
///
/// * `curve` - Directional reserves of the pair
/// * `orders` - Orders selling the taker's output coin, best first
/// * `amount_in` - Exact amount the taker sells
///
/// # Returns
///
/// * `None` - If the taker would receive nothing
///
/// # Example
///
/// ```
/// use hybrid_swap::amm::Curve;
/// use hybrid_swap::engine::sell_exact_in;
/// use num_bigint::BigUint;
///
/// let curve = Curve::new(BigUint::from(10u32).pow(22), BigUint::from(10u32).pow(22));
/// let plan = sell_exact_in(&curve, Vec::new(), &BigUint::from(10u32).pow(18)).unwrap();
/// assert_eq!(plan.amount_out, curve.amount_out(&BigUint::from(10u32).pow(18)).unwrap());
/// ```
pub fn sell_exact_in<I>(curve: &Curve, orders: I, amount_in: &BigUint) -> Option<MatchPlan>
where
    I: IntoIterator<Item = OrderQuote>,
{
    let mut plan = MatchPlan::new(curve.clone());
    plan.amount_in = amount_in.clone();
    let mut left = amount_in.clone();

    for order in orders {
        if left.is_zero() {
            break;
        }
        if let Some((x, y)) = step_to_order(&plan.curve, &order) {
            if left <= x {
                break;
            }
            plan.curve = step(&plan.curve, &x, &y);
            plan.amount_out += y;
            left -= x;
        }

        if left <= order.want {
            let sold = &left * &order.offer / &order.want;
            trace!(id = order.id, bought = %left, sold = %sold, "partial fill");
            plan.amount_out += net_of_fee(&sold);
            plan.fills.push(OrderFill::new(order.id, order.owner, left, sold));
            left = BigUint::zero();
            break;
        }

        trace!(id = order.id, bought = %order.want, sold = %order.offer, "full fill");
        plan.curve = plan
            .curve
            .after_deposit(&fee_from_gross(&order.want), &fee_from_gross(&order.offer));
        plan.amount_out += net_of_fee(&order.offer);
        left -= &order.want;
        plan.fills.push(OrderFill::new(order.id, order.owner, order.want, order.offer));
    }

    if !left.is_zero() {
        if let Some(y) = plan.curve.amount_out(&left) {
            plan.curve = step(&plan.curve, &left, &y);
            plan.amount_out += y;
        }
    }

    if plan.amount_out.is_zero() {
        return None;
    }
    Some(plan)
}

/// Buy exactly `amount_out` across the curve and `orders`.
///
/// A partially matched order hands over enough gross escrow for the taker
/// to net at least the remaining amount; the taker pays the order's price
/// for it, rounded up.
///
/// # Returns
///
/// * `None` - If the curve cannot supply the remainder
pub fn buy_exact_out<I>(curve: &Curve, orders: I, amount_out: &BigUint) -> Option<MatchPlan>
where
    I: IntoIterator<Item = OrderQuote>,
{
    let mut plan = MatchPlan::new(curve.clone());
    plan.amount_out = amount_out.clone();
    let mut left = amount_out.clone();

    for order in orders {
        if left.is_zero() {
            break;
        }
        if let Some((x, y)) = step_to_order(&plan.curve, &order) {
            if left <= y {
                break;
            }
            plan.curve = step(&plan.curve, &x, &y);
            plan.amount_in += x;
            left -= y;
        }

        let net = net_of_fee(&order.offer);
        if left <= net {
            let gross = (&left + fee_on_net(&left)).min(order.offer.clone());
            let cost = ceil_div(&(&gross * &order.want), &order.offer).min(order.want.clone());
            trace!(id = order.id, bought = %cost, sold = %gross, "partial fill");
            plan.amount_in += &cost;
            plan.fills.push(OrderFill::new(order.id, order.owner, cost, gross));
            left = BigUint::zero();
            break;
        }

        trace!(id = order.id, bought = %order.want, sold = %order.offer, "full fill");
        plan.curve = plan
            .curve
            .after_deposit(&fee_from_gross(&order.want), &fee_from_gross(&order.offer));
        plan.amount_in += &order.want;
        left -= net;
        plan.fills.push(OrderFill::new(order.id, order.owner, order.want, order.offer));
    }

    if !left.is_zero() {
        let x = plan.curve.amount_in(&left)?;
        plan.curve = step(&plan.curve, &x, &left);
        plan.amount_in += x;
    }
    Some(plan)
}

// ============================================================================
// Unit Tests
// ============================================================================
