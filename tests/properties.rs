//! Property tests for the curve arithmetic, the walks and book ordering.

use num_bigint::BigUint;
use num_traits::Zero;
use proptest::prelude::*;

use hybrid_swap::amm::fee::{fee_from_gross, net_of_fee};
use hybrid_swap::amm::Curve;
use hybrid_swap::engine::{sell_exact_in, OrderQuote};
use hybrid_swap::orderbook::OrderBook;
use hybrid_swap::{Address, LimitOrder, MemoryTree, PairKey, Side};

// ============================================================================
// Test Strategies
// ============================================================================

fn e15(v: u64) -> BigUint {
    BigUint::from(v) * BigUint::from(10u32).pow(15)
}

/// Reserves between 1 and 10^9 whole units
fn reserves() -> impl Strategy<Value = (BigUint, BigUint)> {
    (1_000u64..1_000_000_000_000, 1_000u64..1_000_000_000_000).prop_map(|(a, b)| (e15(a), e15(b)))
}

/// Trade sizes from dust up to large relative moves
fn trade() -> impl Strategy<Value = BigUint> {
    prop_oneof![
        (1u64..1_000_000).prop_map(BigUint::from),
        (1u64..10_000_000_000).prop_map(e15),
    ]
}

/// Order volumes as (want_buy, want_sell)
fn volumes() -> impl Strategy<Value = (u64, u64)> {
    (1u64..1_000_000, 1u64..1_000_000)
}

// ============================================================================
// Curve Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_curve_step_never_shrinks_product((reserve_in, reserve_out) in reserves(), amount_in in trade()) {
        let curve = Curve::new(reserve_in, reserve_out);
        if let Some(out) = curve.amount_out(&amount_in) {
            prop_assert!(curve.check_swap(&amount_in, &out).is_ok());
            let after = curve.after_swap(&amount_in, &out);
            prop_assert!(
                after.reserve_in() * after.reserve_out() >= curve.reserve_in() * curve.reserve_out()
            );
        }
    }

    #[test]
    fn prop_buying_back_the_output_costs_no_more((reserve_in, reserve_out) in reserves(), amount_in in trade()) {
        let curve = Curve::new(reserve_in, reserve_out);
        if let Some(out) = curve.amount_out(&amount_in) {
            let cost = curve.amount_in(&out).expect("output below reserve is buyable");
            prop_assert!(cost <= amount_in);
            // The quoted cost itself is a valid trade
            prop_assert!(curve.check_swap(&cost, &out).is_ok());
        }
    }

    #[test]
    fn prop_fee_split_adds_up(amount in 1u64..u64::MAX) {
        let gross = BigUint::from(amount);
        let fee = fee_from_gross(&gross);
        prop_assert_eq!(net_of_fee(&gross) + &fee, gross.clone());
        prop_assert!(!fee.is_zero());
    }
}

// ============================================================================
// Walk Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_sell_walk_respects_order_volumes(
        (reserve_in, reserve_out) in reserves(),
        amount_in in trade(),
        book in prop::collection::vec(volumes(), 0..12),
    ) {
        let curve = Curve::new(reserve_in, reserve_out);
        // Quotes must come best first: ascending want/offer
        let mut quotes: Vec<OrderQuote> = book
            .into_iter()
            .enumerate()
            .map(|(i, (want, offer))| OrderQuote::new(i as u32 + 1, Address::new([1; 20]), e15(want), e15(offer)))
            .collect();
        quotes.sort_by(|a, b| (&a.want * &b.offer).cmp(&(&b.want * &a.offer)).then(a.id.cmp(&b.id)));

        if let Some(plan) = sell_exact_in(&curve, quotes.clone(), &amount_in) {
            prop_assert_eq!(&plan.amount_in, &amount_in);
            prop_assert!(!plan.amount_out.is_zero());

            let mut bought = BigUint::zero();
            for fill in &plan.fills {
                let quote = quotes.iter().find(|q| q.id == fill.order_id).expect("fill of a listed quote");
                prop_assert!(fill.bought <= quote.want);
                prop_assert!(fill.sold <= quote.offer);
                bought += &fill.bought;
            }
            prop_assert!(bought <= amount_in);
            prop_assert!(
                plan.curve.reserve_in() * plan.curve.reserve_out() >= curve.reserve_in() * curve.reserve_out()
            );
        }
    }
}

// ============================================================================
// Book Properties
// ============================================================================

fn sample_order(id: u32, side: Side, want_buy: u64, want_sell: u64) -> LimitOrder {
    LimitOrder::new(
        id,
        PairKey::new(1, 2),
        side,
        Address::new([9; 20]),
        e15(want_buy),
        e15(want_sell),
        1,
    )
}

proptest! {
    #[test]
    fn prop_book_side_is_price_then_id_ordered(book in prop::collection::vec((volumes(), any::<bool>()), 1..40)) {
        let tree = MemoryTree::new();
        let snapshot = tree.latest();
        let mut orders = OrderBook::new(PairKey::new(1, 2), 8);
        for (i, ((want_buy, want_sell), sale)) in book.into_iter().enumerate() {
            let side = if sale { Side::Sell } else { Side::Buy };
            orders.insert(sample_order(i as u32 + 1, side, want_buy, want_sell));
        }

        for side in [Side::Buy, Side::Sell] {
            orders.load_all(snapshot.as_ref(), side);
            let keys: Vec<_> = orders.side(side).iter().copied().collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0].price <= pair[1].price);
                if pair[0].price == pair[1].price {
                    prop_assert!(pair[0].id < pair[1].id);
                }
            }
            for key in &keys {
                let order = orders.cached_order(key.id).expect("indexed order is materialized");
                prop_assert_eq!(order.side, side);
                prop_assert_eq!(order.sort_price(), key.price);
            }
        }
    }

    #[test]
    fn prop_proportional_fill_keeps_rate(
        (want_buy, want_sell) in (1u64..10_000, 1u64..10_000),
        scale in 2u64..50,
        part in 1u64..50,
    ) {
        prop_assume!(part < scale);
        let mut tree = MemoryTree::new();
        let mut book = OrderBook::new(PairKey::new(1, 2), 8);
        book.load_all(tree.latest().as_ref(), Side::Sell);
        book.insert(sample_order(1, Side::Sell, want_buy * scale, want_sell * scale));
        book.commit(&mut tree, 16).unwrap();
        tree.commit_version();
        prop_assert!(book.cached_order(1).unwrap().is_keep_rate());

        book.apply_fill(Side::Sell, 1, &e15(want_buy * part), &e15(want_sell * part));
        let order = book.cached_order(1).unwrap();
        prop_assert!(order.is_keep_rate());
        prop_assert_eq!(order.want_sell.clone(), e15(want_sell * (scale - part)));
    }
}
