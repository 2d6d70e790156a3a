//! Stress tests for the hybrid swap engine.
//!
//! These tests verify:
//! 1. Long random operation sequences never break an engine invariant
//! 2. Determinism is preserved across runs (identical store roots)
//! 3. The solvency checker always equals reserves plus order escrow
//! 4. A restarted engine over the committed store sees the same state
//!
//! ## Running Stress Tests
//!
//! ```bash
//! # Run all stress tests (release mode recommended)
//! cargo test --release --test stress_test -- --nocapture
//!
//! # Run specific test
//! cargo test --release --test stress_test verify_determinism -- --nocapture
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use hybrid_swap::ledger::BalanceLedger;
use hybrid_swap::{Address, CoinId, EngineConfig, MemoryBus, MemoryTree, Side, Swap, SwapError, SwapReceipt};

use num_bigint::{BigInt, BigUint};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ============================================================================
// TEST CONSTANTS
// ============================================================================

/// Operations in the main stress run
const STRESS_STEPS: usize = 3_000;

/// Operations per block
const STEPS_PER_BLOCK: usize = 10;

/// Coins traded in every run
const COINS: [CoinId; 3] = [CoinId(1), CoinId(2), CoinId(3)];

/// Number of makers placing orders
const MAKERS: u8 = 8;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn unit(exp: u32) -> BigUint {
    BigUint::from(10u32).pow(exp)
}

/// Small book caches so lazy loading is exercised constantly
fn stress_config() -> EngineConfig {
    EngineConfig {
        order_expiry_blocks: 40,
        cache_retain: 8,
        load_batch: 4,
        ..EngineConfig::default()
    }
}

#[derive(Debug, Default)]
struct RunStats {
    orders_placed: usize,
    orders_rejected: usize,
    orders_cancelled: usize,
    orders_expired: usize,
    swaps: usize,
    swaps_rejected: usize,
    fills: usize,
    refunds: usize,
    blocks: u64,
}

struct Harness {
    tree: MemoryTree,
    bus: MemoryBus,
    swap: Swap,
    trader: Address,
    live: Vec<u32>,
    height: u64,
    stats: RunStats,
}

impl Harness {
    fn new() -> Self {
        let tree = MemoryTree::new();
        let bus = MemoryBus::new();
        let swap = Swap::new(tree.latest(), bus.bus(), stress_config());
        let trader = Address::new([0xAA; 20]);

        let rich = unit(30);
        for coin in COINS {
            bus.ledger.credit(&trader, coin, &rich);
            for maker in 1..=MAKERS {
                bus.ledger.credit(&Address::new([maker; 20]), coin, &rich);
            }
        }

        let provider = Address::new([0xEE; 20]);
        let pools = [(0, 1, 1_000_000u64, 1_000_000u64), (0, 2, 500_000, 2_000_000), (1, 2, 3_000_000, 750_000)];
        for (a, b, reserve_a, reserve_b) in pools {
            let amount_a = BigUint::from(reserve_a) * unit(18);
            let amount_b = BigUint::from(reserve_b) * unit(18);
            bus.ledger.credit(&provider, COINS[a], &amount_a);
            bus.ledger.credit(&provider, COINS[b], &amount_b);
            swap.create_pool(&provider, COINS[a], COINS[b], &amount_a, &amount_b)
                .expect("pool creation");
        }

        let mut harness = Self {
            tree,
            bus,
            swap,
            trader,
            live: Vec::new(),
            height: 1,
            stats: RunStats::default(),
        };
        harness.end_block();
        harness
    }

    fn pick_direction(rng: &mut ChaCha8Rng) -> (CoinId, CoinId) {
        let a = rng.gen_range(0..COINS.len());
        let b = (a + rng.gen_range(1..COINS.len())) % COINS.len();
        (COINS[a], COINS[b])
    }

    fn place(&mut self, rng: &mut ChaCha8Rng) {
        let (coin_buy, coin_sell) = Self::pick_direction(rng);
        let view = self.swap.pair(coin_buy, coin_sell).expect("pool exists");
        let (reserve_buy, reserve_sell) = view.reserves();

        // Price between 1.01x and 1.5x the curve, inside the admission band
        let want_sell = BigUint::from(rng.gen_range(1u32..=50_000)) * unit(15);
        let k = rng.gen_range(101u32..=150);
        let want_buy = &want_sell * &reserve_buy * k / (&reserve_sell * 100u32);

        let owner = Address::new([rng.gen_range(1..=MAKERS); 20]);
        match self
            .swap
            .place_order(&owner, coin_buy, coin_sell, &want_buy, &want_sell, self.height)
        {
            Ok(order) => {
                self.live.push(order.id);
                self.stats.orders_placed += 1;
            }
            Err(_) => self.stats.orders_rejected += 1,
        }
    }

    fn sell(&mut self, rng: &mut ChaCha8Rng) {
        let (coin_in, coin_out) = Self::pick_direction(rng);
        let (reserve_in, _) = self.swap.pair(coin_in, coin_out).expect("pool exists").reserves();
        let amount_in = reserve_in / rng.gen_range(50u32..=2_000);
        let result = self
            .swap
            .sell_with_orders(&self.trader, coin_in, coin_out, &amount_in, &BigUint::from(0u32));
        self.settle(coin_in, coin_out, result);
    }

    fn buy(&mut self, rng: &mut ChaCha8Rng) {
        let (coin_in, coin_out) = Self::pick_direction(rng);
        let (_, reserve_out) = self.swap.pair(coin_in, coin_out).expect("pool exists").reserves();
        let amount_out = reserve_out / rng.gen_range(20u32..=400);
        let result = self
            .swap
            .buy_with_orders(&self.trader, coin_in, coin_out, &amount_out, &unit(29));
        self.settle(coin_in, coin_out, result);
    }

    /// Apply the taker's own flows the way a transaction layer would
    fn settle(
        &mut self,
        coin_in: CoinId,
        coin_out: CoinId,
        result: Result<SwapReceipt, SwapError>,
    ) {
        match result {
            Ok(receipt) => {
                self.bus.ledger.debit(&self.trader, coin_in, &receipt.amount_in);
                self.bus.ledger.credit(&self.trader, coin_out, &receipt.amount_out);
                self.stats.swaps += 1;
                self.stats.fills += receipt.fills.len();
                self.stats.refunds += receipt.refunds.len();
            }
            Err(_) => self.stats.swaps_rejected += 1,
        }
    }

    fn cancel(&mut self, rng: &mut ChaCha8Rng) {
        if self.live.is_empty() {
            return;
        }
        let id = self.live.swap_remove(rng.gen_range(0..self.live.len()));
        if let Some(order) = self.swap.order(id) {
            self.swap.cancel_order(&order.owner, id).expect("owner cancels");
            self.stats.orders_cancelled += 1;
        }
    }

    fn end_block(&mut self) {
        self.stats.orders_expired += self.swap.expire_orders_at(self.height).len();
        self.swap.commit(&mut self.tree).expect("commit");
        self.swap.set_snapshot(self.tree.commit_version());
        self.height += 1;
        self.stats.blocks += 1;
    }

    fn step(&mut self, rng: &mut ChaCha8Rng) {
        match rng.gen_range(0..100) {
            0..=39 => self.place(rng),
            40..=69 => self.sell(rng),
            70..=84 => self.buy(rng),
            _ => self.cancel(rng),
        }
    }

    fn root(&self) -> [u8; 32] {
        self.tree.latest().root()
    }
}

/// Log output for `RUST_LOG=hybrid_swap=debug` runs
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run a deterministic operation sequence and return the harness.
fn run_deterministic_sequence(seed: u64, steps: usize) -> Harness {
    init_tracing();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut harness = Harness::new();
    for i in 0..steps {
        harness.step(&mut rng);
        if (i + 1) % STEPS_PER_BLOCK == 0 {
            harness.end_block();
        }
    }
    harness.end_block();
    harness
}

/// Engine holdings per coin: reserves plus escrow of every live order
fn holdings(swap: &Swap) -> BTreeMap<CoinId, BigInt> {
    let mut held: BTreeMap<CoinId, BigInt> = BTreeMap::new();
    for handle in swap.pools(&CancellationToken::new()) {
        let (reserve0, reserve1) = handle.reserves();
        *held.entry(handle.coin0()).or_default() += BigInt::from(reserve0);
        *held.entry(handle.coin1()).or_default() += BigInt::from(reserve1);
        for side in [Side::Buy, Side::Sell] {
            for order in handle.pair().all_orders(side) {
                *held.entry(order.coin_sell()).or_default() += BigInt::from(order.want_sell);
            }
        }
    }
    held
}

fn assert_solvent(harness: &Harness) {
    for (coin, held) in holdings(&harness.swap) {
        assert_eq!(
            harness.bus.checker.net(coin),
            held,
            "checker disagrees with holdings of coin {}",
            coin
        );
    }
}

// ============================================================================
// STRESS TESTS
// ============================================================================

/// Main stress test: a long mixed sequence of orders, swaps and cancels.
///
/// # Verification
/// - No panics during execution (every engine invariant holds)
/// - Orders are matched, refunded and expired along the way
/// - Net flows equal reserves plus escrow at the end
#[test]
fn stress_mixed_operations() {
    println!("\n=== STRESS TEST: {} Mixed Operations ===\n", STRESS_STEPS);

    let start = Instant::now();
    let harness = run_deterministic_sequence(42, STRESS_STEPS);
    let elapsed = start.elapsed();
    let stats = &harness.stats;

    println!("=== RESULTS ===");
    println!("  Blocks committed:  {:>12}", stats.blocks);
    println!("  Orders placed:     {:>12}", stats.orders_placed);
    println!("  Orders rejected:   {:>12}", stats.orders_rejected);
    println!("  Orders cancelled:  {:>12}", stats.orders_cancelled);
    println!("  Orders expired:    {:>12}", stats.orders_expired);
    println!("  Swaps executed:    {:>12}", stats.swaps);
    println!("  Swaps rejected:    {:>12}", stats.swaps_rejected);
    println!("  Order fills:       {:>12}", stats.fills);
    println!("  Dust refunds:      {:>12}", stats.refunds);
    println!();
    println!("  Elapsed time:      {:>12.2?}", elapsed);
    println!(
        "  Throughput:        {:>12.0} ops/sec",
        STRESS_STEPS as f64 / elapsed.as_secs_f64()
    );
    println!("  State root:        {}", hex::encode(harness.root()));

    assert!(stats.orders_placed > 0, "Expected orders to be placed");
    assert!(stats.swaps > 0, "Expected swaps to execute");
    assert!(stats.fills > 0, "Expected swaps to match resting orders");
    assert!(stats.orders_expired > 0, "Expected the expiry sweep to fire");
    assert_solvent(&harness);

    println!("\n=== STRESS TEST PASSED ===\n");
}

/// Verify determinism: same sequence produces identical state root.
///
/// This is critical for consensus - all nodes must produce the same
/// final state given the same input sequence.
#[test]
fn verify_determinism() {
    println!("\n=== DETERMINISM TEST ===\n");

    const TEST_STEPS: usize = 600;
    const SEED: u64 = 12345;

    let root1 = run_deterministic_sequence(SEED, TEST_STEPS).root();
    let root2 = run_deterministic_sequence(SEED, TEST_STEPS).root();

    println!("  Run 1 state root: {}", hex::encode(root1));
    println!("  Run 2 state root: {}", hex::encode(root2));
    assert_eq!(root1, root2, "State roots must match for determinism");

    let root3 = run_deterministic_sequence(SEED + 1, TEST_STEPS).root();
    println!("  Different seed:   {}", hex::encode(root3));
    assert_ne!(root1, root3, "Different seeds should produce different roots");

    println!("\n=== DETERMINISM VERIFIED ===\n");
}

/// A fresh engine over the committed store sees exactly the live state.
#[test]
fn stress_restart_equivalence() {
    println!("\n=== RESTART EQUIVALENCE TEST ===\n");

    let harness = run_deterministic_sequence(7, 800);
    let restarted = Swap::new(harness.tree.latest(), harness.bus.bus(), stress_config());

    let cancel = CancellationToken::new();
    let live = harness.swap.export(&cancel);
    let fresh = restarted.export(&cancel);
    assert_eq!(live, fresh);

    for pool in harness.swap.pools(&cancel) {
        let reloaded = restarted.pair(pool.coin0(), pool.coin1()).expect("pool reloads");
        assert_eq!(pool.reserves(), reloaded.reserves());
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(pool.pair().all_orders(side), reloaded.pair().all_orders(side));
        }
    }
    assert_eq!(harness.swap.next_order_id(), restarted.next_order_id());
    assert_eq!(harness.swap.next_pool_id(), restarted.next_pool_id());

    println!("  Pools:  {:>8}", live.pools.len());
    println!("  Orders: {:>8}", live.order_count());
    println!("\n=== RESTART EQUIVALENCE PASSED ===\n");
}
