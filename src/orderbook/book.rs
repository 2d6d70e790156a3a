//! Per-pair order book cache.
//!
//! ## Architecture
//!
//! An [`OrderBook`] owns the in-memory state of one pair's orders:
//!
//! - **Records**: materialized [`LimitOrder`]s by id
//! - **Sides**: two [`BookSide`] indexes, lazily extended from the store
//! - **Dirty set**: live orders created or changed since the last commit
//! - **Retired set**: orders removed since the last commit (consumed,
//!   cancelled or expired), kept until their records are deleted
//!
//! A range scan against the snapshot skips every dirty or retired id: the
//! in-memory copy of such an order supersedes the stored one, and a retired
//! order is gone. Dirty orders are positioned in memory by their current
//! price, so a changed price is a plain remove-and-insert on the index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::ControlFlow;

use num_bigint::BigUint;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::orderbook::side::{BookSide, SortKey};
use crate::store::records::{encode_order, read_order};
use crate::store::{keys, scan_prefix, Snapshot, StoreWriter};
use crate::types::{LimitOrder, PairKey, Side};

/// What a fill did to the order it matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillEffect {
    /// Amounts reduced, order still rests on the book
    Reduced,
    /// Order fully consumed and retired; `residual` of its escrow is left
    /// over when only one side reached zero
    Retired { residual: BigUint },
}

/// In-memory order book of one pair.
#[derive(Debug)]
pub struct OrderBook {
    pair: PairKey,
    orders: HashMap<u32, LimitOrder>,
    dirty: BTreeSet<u32>,
    retired: BTreeMap<u32, LimitOrder>,
    buy: BookSide,
    sell: BookSide,
    load_batch: usize,
}

impl OrderBook {
    /// Create an empty cache for the canonical `pair`
    ///
    /// # Arguments
    ///
    /// * `pair` - Canonical pair key
    /// * `load_batch` - Index entries fetched per range scan
    pub fn new(pair: PairKey, load_batch: usize) -> Self {
        debug_assert!(pair.is_sorted());
        Self {
            pair,
            orders: HashMap::new(),
            dirty: BTreeSet::new(),
            retired: BTreeMap::new(),
            buy: BookSide::new(),
            sell: BookSide::new(),
            load_batch: load_batch.max(1),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn pair(&self) -> PairKey {
        self.pair
    }

    /// One side of the book
    #[inline]
    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    #[inline]
    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    /// True when there are changes not yet flushed
    #[cfg(test)]
    fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.retired.is_empty()
    }

    /// Number of materialized order records
    #[cfg(test)]
    fn materialized(&self) -> usize {
        self.orders.len()
    }

    #[inline]
    fn is_touched(&self, id: u32) -> bool {
        self.dirty.contains(&id) || self.retired.contains_key(&id)
    }

    // ========================================================================
    // Lazy loading
    // ========================================================================

    /// Read the next batch of a side's price index from the snapshot.
    fn load_batch(&mut self, snapshot: &dyn Snapshot, side: Side) {
        let prefix = keys::index_prefix(&self.pair, side);
        let after = self
            .side(side)
            .boundary()
            .map(|key| keys::index(&self.pair, side, &key.price, key.id));
        let batch = self.load_batch;

        let mut scanned = Vec::with_capacity(batch);
        scan_prefix(snapshot, &prefix, after.as_deref(), &mut |key, _| {
            match keys::parse_index(key) {
                Some((price, id)) => scanned.push(SortKey::new(price, id)),
                None => panic!("corrupted price index key {}", hex::encode(key)),
            }
            if scanned.len() >= batch {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        let exhausted = scanned.len() < batch;

        for key in &scanned {
            if self.is_touched(key.id) {
                continue;
            }
            if !self.orders.contains_key(&key.id) {
                let order = match read_order(snapshot, key.id) {
                    Some(order) => order,
                    None => panic!("price index of {} references missing order {}", self.pair, key.id),
                };
                self.orders.insert(key.id, order);
            }
            self.side_mut(side).load(*key);
        }
        trace!(pair = %self.pair, ?side, scanned = scanned.len(), exhausted, "loaded order index batch");
        self.side_mut(side).advance(scanned.last().copied(), exhausted);
    }

    /// Materialize at least `len` orders of a side, or the whole side.
    pub fn ensure_len(&mut self, snapshot: &dyn Snapshot, side: Side, len: usize) {
        while self.side(side).len() < len && !self.side(side).is_exhausted() {
            self.load_batch(snapshot, side);
        }
    }

    /// Materialize a whole side
    pub fn load_all(&mut self, snapshot: &dyn Snapshot, side: Side) {
        while !self.side(side).is_exhausted() {
            self.load_batch(snapshot, side);
        }
    }

    /// Order at `index` of a side, best first.
    pub fn order_at(&mut self, snapshot: &dyn Snapshot, side: Side, index: usize) -> Option<&LimitOrder> {
        self.ensure_len(snapshot, side, index.saturating_add(1));
        let key = self.side(side).get(index)?;
        self.orders.get(&key.id)
    }

    /// Next order of a side after position `after`, loading as needed.
    pub fn next_after(&mut self, snapshot: &dyn Snapshot, side: Side, after: Option<SortKey>) -> Option<SortKey> {
        loop {
            if let Some(key) = self.side(side).next_after(after) {
                return Some(key);
            }
            if self.side(side).is_exhausted() {
                return None;
            }
            self.load_batch(snapshot, side);
        }
    }

    /// The best `limit` orders of a side
    pub fn top(&mut self, snapshot: &dyn Snapshot, side: Side, limit: usize) -> Vec<LimitOrder> {
        self.ensure_len(snapshot, side, limit);
        let ids: Vec<u32> = self.side(side).iter().take(limit).map(|key| key.id).collect();
        ids.iter().filter_map(|id| self.orders.get(id).cloned()).collect()
    }

    /// Look up a live order of this pair by id.
    pub fn order(&mut self, snapshot: &dyn Snapshot, id: u32) -> Option<&LimitOrder> {
        if self.retired.contains_key(&id) {
            return None;
        }
        if !self.orders.contains_key(&id) {
            let order = read_order(snapshot, id)?;
            if order.pair != self.pair {
                return None;
            }
            self.orders.insert(id, order);
        }
        self.orders.get(&id)
    }

    /// Materialized record by id, without touching the store
    pub fn cached_order(&self, id: u32) -> Option<&LimitOrder> {
        self.orders.get(&id)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add a new order to its side.
    ///
    /// # Panics
    ///
    /// Panics if the order belongs to another pair or its id is already
    /// materialized.
    pub fn insert(&mut self, order: LimitOrder) {
        assert_eq!(order.pair, self.pair, "order {} inserted into wrong book", order.id);
        assert!(
            !self.orders.contains_key(&order.id),
            "order {} already exists",
            order.id
        );
        let key = SortKey::of(&order);
        self.side_mut(order.side).place(key);
        self.dirty.insert(order.id);
        debug!(pair = %self.pair, id = order.id, side = ?order.side, price = %key.price, "order placed");
        self.orders.insert(order.id, order);
    }

    /// Reduce a matched order and resort it.
    ///
    /// An order keeping its rate stays where it is; otherwise it moves to
    /// its new position. An order left with either side at zero is retired.
    ///
    /// # Panics
    ///
    /// Panics if the order is not materialized on `side`.
    pub fn apply_fill(&mut self, side: Side, id: u32, bought: &BigUint, sold: &BigUint) -> FillEffect {
        let order = match self.orders.get_mut(&id) {
            Some(order) if order.side == side => order,
            _ => panic!("fill of order {} not materialized on {:?} side of {}", id, side, self.pair),
        };
        let old_key = SortKey::of(order);
        order.reduce(bought, sold);

        if order.is_empty() {
            let residual = order.want_sell.clone();
            self.retire(side, old_key);
            return FillEffect::Retired { residual };
        }

        let new_key = SortKey::of(order);
        self.dirty.insert(id);
        if new_key != old_key {
            let side_index = self.side_mut(side);
            assert!(side_index.unplace(&old_key), "order {} missing from book index", id);
            side_index.place(new_key);
        }
        FillEffect::Reduced
    }

    /// Remove a live order, returning its last state.
    pub fn remove(&mut self, snapshot: &dyn Snapshot, id: u32) -> Option<LimitOrder> {
        let order = self.order(snapshot, id)?.clone();
        self.retire(order.side, SortKey::of(&order));
        Some(order)
    }

    fn retire(&mut self, side: Side, key: SortKey) {
        self.side_mut(side).unplace(&key);
        self.dirty.remove(&key.id);
        if let Some(order) = self.orders.remove(&key.id) {
            debug!(pair = %self.pair, id = key.id, "order retired");
            self.retired.insert(key.id, order);
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Flush dirty and retired orders, ascending by id.
    ///
    /// Writes per order:
    /// - retired and previously stored: remove record and index entry
    /// - live: remove the old index entry if the price moved, then set the
    ///   index entry and the record
    ///
    /// Afterwards each side keeps its best `retain` orders in memory.
    pub fn commit(&mut self, writer: &mut dyn StoreWriter, retain: usize) -> Result<(), StoreError> {
        let ids: BTreeSet<u32> = self.dirty.iter().chain(self.retired.keys()).copied().collect();
        for id in ids {
            if let Some(order) = self.retired.get(&id) {
                if let Some(price) = order.stored_price() {
                    writer.remove(&keys::order(id));
                    writer.remove(&keys::index(&self.pair, order.side, &price, id));
                }
                continue;
            }
            let order = match self.orders.get_mut(&id) {
                Some(order) => order,
                None => panic!("dirty order {} of {} is not materialized", id, self.pair),
            };
            let price = order.sort_price();
            if let Some(old) = order.stored_price() {
                if old != price {
                    writer.remove(&keys::index(&self.pair, order.side, &old, id));
                }
            }
            writer.set(&keys::index(&self.pair, order.side, &price, id), &[]);
            writer.set(&keys::order(id), &encode_order(order)?);
            order.mark_stored();
        }

        self.dirty.clear();
        self.retired.clear();
        self.buy.truncate(retain);
        self.sell.truncate(retain);
        let keep: BTreeSet<u32> = self.buy.iter().chain(self.sell.iter()).map(|key| key.id).collect();
        self.orders.retain(|id, _| keep.contains(id));
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
