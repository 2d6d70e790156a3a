//! Versioned key-value store interface.
//!
//! ## Architecture
//!
//! The engine reads committed state from an immutable [`Snapshot`] and
//! flushes pending state through a [`StoreWriter`] at block commit. The store
//! behind both is a Merkle tree: every write changes the root, so the order of
//! writes is part of the consensus-visible result.
//!
//! - [`keys`]: Layout of the engine's namespace
//! - [`records`]: SSZ encoding of persisted records
//! - [`MemoryTree`]: In-memory versioned tree with a hash-chained root

use std::ops::{Bound, ControlFlow};

pub mod keys;
pub mod records;
pub mod memory;

pub use memory::{MemorySnapshot, MemoryTree};

/// Read-only view of one committed store version.
///
/// Implementations are immutable: readers holding a snapshot never observe
/// later writes.
pub trait Snapshot: Send + Sync {
    /// Version number of this snapshot
    fn version(&self) -> u64;

    /// Point lookup
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Visit entries with keys inside `range` in ascending key order until
    /// the visitor breaks.
    fn scan(
        &self,
        range: (Bound<&[u8]>, Bound<&[u8]>),
        visit: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    );
}

/// Sink for pending writes of the next version
pub trait StoreWriter {
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn remove(&mut self, key: &[u8]);
}

/// Smallest key greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (prefix of all `0xFF`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Visit every entry under `prefix`, optionally starting strictly after `after`.
pub fn scan_prefix(
    snapshot: &dyn Snapshot,
    prefix: &[u8],
    after: Option<&[u8]>,
    visit: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
) {
    let end = prefix_end(prefix);
    let start = match after {
        Some(key) => Bound::Excluded(key),
        None => Bound::Included(prefix),
    };
    let end = match &end {
        Some(end) => Bound::Excluded(end.as_slice()),
        None => Bound::Unbounded,
    };
    snapshot.scan((start, end), visit);
}

// ============================================================================
// Unit Tests
// ============================================================================
