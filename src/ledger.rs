//! Collaborators consumed by the engine.
//!
//! ## Architecture
//!
//! The engine never owns account balances. It talks to three capabilities:
//!
//! - [`BalanceLedger`]: credits and debits account balances (maker payouts,
//!   order escrow, liquidity provider settlements)
//! - [`SolvencyChecker`]: receives every change to the coins the engine
//!   holds (reserves plus order escrow), for independent auditing
//! - [`EventSink`]: receives structured notifications
//!
//! They are grouped in a [`Bus`] handed to the engine at construction. The
//! in-memory implementations here back the tests and simple embeddings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use parking_lot::Mutex;

use crate::types::{Address, CoinId};

// ============================================================================
// Capabilities
// ============================================================================

/// Account balances
pub trait BalanceLedger: Send + Sync {
    /// Add `amount` of `coin` to `owner`
    fn credit(&self, owner: &Address, coin: CoinId, amount: &BigUint);

    /// Remove `amount` of `coin` from `owner`; callers check the balance first
    fn debit(&self, owner: &Address, coin: CoinId, amount: &BigUint);

    /// Current balance of `coin` held by `owner`
    fn balance(&self, owner: &Address, coin: CoinId) -> BigUint;
}

/// Per-coin net flow into the engine
pub trait SolvencyChecker: Send + Sync {
    /// Record a signed change of the amount of `coin` the engine holds
    fn note_delta(&self, coin: CoinId, delta: &BigInt);
}

/// An order removed by the expiry sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderExpired {
    pub order_id: u32,
    pub owner: Address,
    pub coin: CoinId,
    pub amount: BigUint,
}

/// Structured notifications
pub trait EventSink: Send + Sync {
    fn order_expired(&self, event: OrderExpired);
}

/// Collaborators of one engine instance
#[derive(Clone)]
pub struct Bus {
    pub ledger: Arc<dyn BalanceLedger>,
    pub checker: Arc<dyn SolvencyChecker>,
    pub events: Arc<dyn EventSink>,
}

impl Bus {
    pub fn new(
        ledger: Arc<dyn BalanceLedger>,
        checker: Arc<dyn SolvencyChecker>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ledger,
            checker,
            events,
        }
    }

    /// Note an inflow of `amount` of `coin`
    pub(crate) fn note_in(&self, coin: CoinId, amount: &BigUint) {
        if !amount.is_zero() {
            self.checker.note_delta(coin, &BigInt::from(amount.clone()));
        }
    }

    /// Note an outflow of `amount` of `coin`
    pub(crate) fn note_out(&self, coin: CoinId, amount: &BigUint) {
        if !amount.is_zero() {
            self.checker.note_delta(coin, &-BigInt::from(amount.clone()));
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").finish_non_exhaustive()
    }
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// HashMap-backed ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: Mutex<HashMap<(Address, CoinId), BigUint>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalanceLedger for MemoryLedger {
    fn credit(&self, owner: &Address, coin: CoinId, amount: &BigUint) {
        let mut balances = self.balances.lock();
        *balances.entry((*owner, coin)).or_default() += amount;
    }

    fn debit(&self, owner: &Address, coin: CoinId, amount: &BigUint) {
        let mut balances = self.balances.lock();
        let balance = balances.entry((*owner, coin)).or_default();
        assert!(
            *balance >= *amount,
            "debit of {} coin {} exceeds balance {} of {}",
            amount,
            coin,
            balance,
            owner
        );
        *balance -= amount;
    }

    fn balance(&self, owner: &Address, coin: CoinId) -> BigUint {
        self.balances
            .lock()
            .get(&(*owner, coin))
            .cloned()
            .unwrap_or_default()
    }
}

/// Checker accumulating the net flow per coin
#[derive(Debug, Default)]
pub struct NetFlowChecker {
    flows: Mutex<BTreeMap<CoinId, BigInt>>,
}

impl NetFlowChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Net amount of `coin` that flowed into the engine
    pub fn net(&self, coin: CoinId) -> BigInt {
        self.flows.lock().get(&coin).cloned().unwrap_or_default()
    }
}

impl SolvencyChecker for NetFlowChecker {
    fn note_delta(&self, coin: CoinId, delta: &BigInt) {
        *self.flows.lock().entry(coin).or_default() += delta;
    }
}

/// Sink recording every event
#[derive(Debug, Default)]
pub struct EventLog {
    expired: Mutex<Vec<OrderExpired>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry events received so far
    pub fn expired(&self) -> Vec<OrderExpired> {
        self.expired.lock().clone()
    }
}

impl EventSink for EventLog {
    fn order_expired(&self, event: OrderExpired) {
        self.expired.lock().push(event);
    }
}

/// In-memory collaborators with typed handles for inspection
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    pub ledger: Arc<MemoryLedger>,
    pub checker: Arc<NetFlowChecker>,
    pub events: Arc<EventLog>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased bus sharing these collaborators
    pub fn bus(&self) -> Bus {
        Bus::new(self.ledger.clone(), self.checker.clone(), self.events.clone())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
