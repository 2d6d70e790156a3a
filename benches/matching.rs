//! Benchmarks for the hybrid swap engine.
//!
//! | Group              | What it measures                                  |
//! |--------------------|---------------------------------------------------|
//! | walk               | Pure matching walks over curve and order quotes   |
//! | swap               | Full swaps against a pair with a resting book     |
//! | order_operations   | Order placement and cancellation                  |
//! | commit             | Flushing a block of mutations into the store      |
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark
//! cargo bench -- walk
//! ```
//!
//! Results are saved to `target/criterion/` with HTML reports.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use hybrid_swap::amm::Curve;
use hybrid_swap::engine::{buy_exact_out, sell_exact_in, OrderQuote};
use hybrid_swap::ledger::BalanceLedger;
use hybrid_swap::{Address, CoinId, EngineConfig, MemoryBus, MemoryTree, Swap};
use num_bigint::BigUint;

// ============================================================================
// HELPER FUNCTIONS - Deterministic book generation
// ============================================================================

const A: CoinId = CoinId(1);
const B: CoinId = CoinId(2);

fn e18(v: u64) -> BigUint {
    BigUint::from(v) * BigUint::from(10u32).pow(18)
}

/// Quotes selling 10 units each, priced from 1.001x upward in 0.1% steps
fn quote_ladder(count: usize) -> Vec<OrderQuote> {
    (0..count)
        .map(|i| {
            let offer = e18(10);
            let want = &offer * (1_001 + i as u64) / 1_000u32;
            OrderQuote::new(i as u32 + 1, Address::new([1; 20]), want, offer)
        })
        .collect()
}

/// An engine with one 1M/1M pool and `orders` resting sell orders on it
fn engine_with_book(orders: usize) -> (MemoryTree, MemoryBus, Swap) {
    let mut tree = MemoryTree::new();
    let bus = MemoryBus::new();
    let swap = Swap::new(tree.latest(), bus.bus(), EngineConfig::default());

    let provider = Address::new([0xEE; 20]);
    bus.ledger.credit(&provider, A, &e18(1_000_000));
    bus.ledger.credit(&provider, B, &e18(1_000_000));
    swap.create_pool(&provider, A, B, &e18(1_000_000), &e18(1_000_000))
        .expect("pool creation");

    let maker = Address::new([7; 20]);
    bus.ledger.credit(&maker, B, &e18(1_000_000_000));
    for i in 0..orders {
        let want_sell = e18(100);
        let want_buy = &want_sell * (1_001 + i as u64) / 1_000u32;
        swap.place_order(&maker, A, B, &want_buy, &want_sell, 1)
            .expect("order placement");
    }
    swap.commit(&mut tree).expect("commit");
    swap.set_snapshot(tree.commit_version());
    (tree, bus, swap)
}

// ============================================================================
// BENCHMARK: Pure walks
// ============================================================================

fn bench_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk");
    group.measurement_time(Duration::from_secs(5));

    let curve = Curve::new(e18(10_000), e18(10_000));
    group.bench_function("curve_only_sell", |b| {
        b.iter(|| black_box(sell_exact_in(&curve, Vec::new(), &e18(10))))
    });

    for depth in [10usize, 100, 1_000] {
        let quotes = quote_ladder(depth);
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("sell_sweep", depth), &quotes, |b, quotes| {
            b.iter_batched(
                || quotes.clone(),
                |quotes| black_box(sell_exact_in(&curve, quotes, &e18(20_000))),
                BatchSize::SmallInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("buy_sweep", depth), &quotes, |b, quotes| {
            b.iter_batched(
                || quotes.clone(),
                |quotes| black_box(buy_exact_out(&curve, quotes, &e18(5_000))),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// BENCHMARK: Swaps through the registry
// ============================================================================

fn bench_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(50);

    let trader = Address::new([0xAA; 20]);
    for depth in [0usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("sell_with_orders", depth), &depth, |b, &depth| {
            b.iter_batched(
                || engine_with_book(depth),
                |(_tree, _bus, swap)| {
                    black_box(swap.sell_with_orders(&trader, A, B, &e18(50_000), &BigUint::from(0u32)))
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("quote_with_orders_1k_book", |b| {
        let (_tree, _bus, swap) = engine_with_book(1_000);
        let handle = swap.pair(A, B).expect("pool exists");
        b.iter(|| black_box(handle.calculate_buy_for_sell_with_orders(&e18(50_000))))
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: Order operations
// ============================================================================

fn bench_order_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_operations");
    group.measurement_time(Duration::from_secs(5));

    let maker = Address::new([7; 20]);
    group.bench_function("place_into_1k_book", |b| {
        b.iter_batched(
            || engine_with_book(1_000),
            |(_tree, _bus, swap)| black_box(swap.place_order(&maker, A, B, &e18(150), &e18(100), 2)),
            BatchSize::LargeInput,
        );
    });

    group.bench_function("cancel_from_1k_book", |b| {
        b.iter_batched(
            || engine_with_book(1_000),
            |(_tree, _bus, swap)| black_box(swap.cancel_order(&maker, 500)),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: Commit
// ============================================================================

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for orders in [100usize, 1_000] {
        group.throughput(Throughput::Elements(orders as u64));
        group.bench_with_input(BenchmarkId::new("block_of_orders", orders), &orders, |b, &orders| {
            b.iter(|| {
                let (tree, _bus, _swap) = engine_with_book(orders);
                black_box(tree.latest().root())
            })
        });
    }

    group.finish();
}

// ============================================================================
// CRITERION ENTRY POINT
// ============================================================================

criterion_group!(benches, bench_walk, bench_swap, bench_order_operations, bench_commit);

criterion_main!(benches);
