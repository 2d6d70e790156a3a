//! One side of a pair's order book.
//!
//! ## Cache Model
//!
//! The persisted price index holds the authoritative ordering of a side. A
//! [`BookSide`] materializes a prefix of it:
//!
//! - `cached`: every live order whose key is `<= boundary` (or every live
//!   order once `exhausted`)
//! - `pending`: orders touched in the current block whose new position lies
//!   beyond the loaded boundary; they join `cached` once loading reaches them
//! - `boundary`: the last index entry read from the store
//!
//! Keys are `(sort price, id)`, so iteration order is best order first with
//! ties broken by ascending id.

use std::collections::BTreeSet;
use std::ops::Bound;

use crate::types::{LimitOrder, Price};

/// Position of an order within its side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub price: Price,
    pub id: u32,
}

impl SortKey {
    pub fn new(price: Price, id: u32) -> Self {
        Self { price, id }
    }

    /// Current position of an order
    pub fn of(order: &LimitOrder) -> Self {
        Self::new(order.sort_price(), order.id)
    }
}

/// Lazily loaded, partially materialized side of a book.
#[derive(Debug, Default, Clone)]
pub struct BookSide {
    cached: BTreeSet<SortKey>,
    pending: BTreeSet<SortKey>,
    boundary: Option<SortKey>,
    exhausted: bool,
}

impl BookSide {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized orders
    #[inline]
    pub fn len(&self) -> usize {
        self.cached.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }

    /// True once the whole side is materialized
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Last index entry read from the store
    #[inline]
    pub fn boundary(&self) -> Option<SortKey> {
        self.boundary
    }

    /// Materialized key at `index`
    pub fn get(&self, index: usize) -> Option<SortKey> {
        self.cached.iter().nth(index).copied()
    }

    /// First materialized key strictly after `after` (or the first key)
    pub fn next_after(&self, after: Option<SortKey>) -> Option<SortKey> {
        match after {
            Some(after) => self
                .cached
                .range((Bound::Excluded(after), Bound::Unbounded))
                .next()
                .copied(),
            None => self.cached.iter().next().copied(),
        }
    }

    /// Materialized keys in book order
    pub fn iter(&self) -> impl Iterator<Item = &SortKey> {
        self.cached.iter()
    }

    /// True when `key` lies inside the materialized prefix
    fn covers(&self, key: &SortKey) -> bool {
        self.exhausted || self.boundary.map_or(false, |boundary| *key <= boundary)
    }

    /// Position a live order that was created or moved in memory.
    pub fn place(&mut self, key: SortKey) {
        if self.covers(&key) {
            self.cached.insert(key);
        } else {
            self.pending.insert(key);
        }
    }

    /// Drop an order's in-memory position.
    ///
    /// Returns false when the order was never materialized, which is the
    /// case for stored orders beyond the boundary.
    pub fn unplace(&mut self, key: &SortKey) -> bool {
        self.cached.remove(key) || self.pending.remove(key)
    }

    /// Add an order read from the store during a range scan
    pub(crate) fn load(&mut self, key: SortKey) {
        self.cached.insert(key);
    }

    /// Advance the boundary after a range scan.
    ///
    /// Pending orders now covered by the boundary become materialized.
    pub(crate) fn advance(&mut self, last_scanned: Option<SortKey>, exhausted: bool) {
        if let Some(last) = last_scanned {
            self.boundary = Some(last);
        }
        if exhausted {
            self.exhausted = true;
            self.cached.append(&mut self.pending);
            return;
        }
        if let Some(boundary) = self.boundary {
            let beyond = self
                .pending
                .split_off(&SortKey::new(boundary.price, boundary.id.saturating_add(1)));
            let covered = std::mem::replace(&mut self.pending, beyond);
            self.cached.extend(covered);
        }
    }

    /// Bound memory after a commit: keep the best `retain` orders.
    ///
    /// Pending entries are dropped; they are persisted now and will be read
    /// back by the next range scan.
    pub(crate) fn truncate(&mut self, retain: usize) {
        self.pending.clear();
        if self.cached.len() <= retain {
            return;
        }
        let cut = self.cached.iter().nth(retain).copied();
        if let Some(cut) = cut {
            self.cached.split_off(&cut);
        }
        self.boundary = self.cached.iter().next_back().copied();
        self.exhausted = false;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
