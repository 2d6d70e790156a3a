//! In-memory versioned tree for testing and embedding.
//!
//! ## Architecture
//!
//! - **Working set**: a `BTreeMap` receiving writes for the next version
//! - **Snapshots**: each committed version is an `Arc`-shared, immutable
//!   copy of the map; readers keep whichever version they hold
//! - **Root**: `sha256(previous_root || sha256(write log))`, where the write
//!   log records every `set`/`remove` in call order
//!
//! Chaining the write log into the root makes the root depend on the exact
//! sequence of writes, not just on the resulting contents.

use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::store::{Snapshot, StoreWriter};

const TAG_SET: u8 = 1;
const TAG_REMOVE: u8 = 2;

/// One committed version of a [`MemoryTree`]
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    data: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
    version: u64,
    root: [u8; 32],
}

impl MemorySnapshot {
    /// Root hash of this version
    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Root hash as a hex string
    pub fn root_hex(&self) -> String {
        hex::encode(self.root)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Snapshot for MemorySnapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn scan(
        &self,
        range: (Bound<&[u8]>, Bound<&[u8]>),
        visit: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) {
        for (key, value) in self.data.range::<[u8], _>(range) {
            if visit(key, value).is_break() {
                break;
            }
        }
    }
}

/// Versioned in-memory key-value tree.
///
/// ## Example
///
/// ```
/// use hybrid_swap::store::{MemoryTree, Snapshot, StoreWriter};
///
/// let mut tree = MemoryTree::new();
/// tree.set(b"k", b"v");
/// assert!(tree.latest().get(b"k").is_none());
///
/// let v1 = tree.commit_version();
/// assert_eq!(v1.version(), 1);
/// assert_eq!(v1.get(b"k"), Some(b"v".to_vec()));
/// ```
#[derive(Debug)]
pub struct MemoryTree {
    working: BTreeMap<Vec<u8>, Vec<u8>>,
    log: Sha256,
    writes: usize,
    versions: BTreeMap<u64, Arc<MemorySnapshot>>,
    latest: Arc<MemorySnapshot>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Create an empty tree at version 0
    pub fn new() -> Self {
        let genesis = Arc::new(MemorySnapshot::default());
        let mut versions = BTreeMap::new();
        versions.insert(0, genesis.clone());
        Self {
            working: BTreeMap::new(),
            log: Sha256::new(),
            writes: 0,
            versions,
            latest: genesis,
        }
    }

    /// Most recently committed version
    pub fn latest(&self) -> Arc<MemorySnapshot> {
        self.latest.clone()
    }

    /// A previously committed version
    pub fn snapshot_at(&self, version: u64) -> Option<Arc<MemorySnapshot>> {
        self.versions.get(&version).cloned()
    }

    /// Number of writes pending for the next version
    pub fn pending_writes(&self) -> usize {
        self.writes
    }

    /// Seal pending writes into a new version.
    pub fn commit_version(&mut self) -> Arc<MemorySnapshot> {
        let log = std::mem::replace(&mut self.log, Sha256::new()).finalize();
        let mut hasher = Sha256::new();
        hasher.update(self.latest.root);
        hasher.update(log);
        let mut root = [0u8; 32];
        root.copy_from_slice(&hasher.finalize());

        let snapshot = Arc::new(MemorySnapshot {
            data: Arc::new(self.working.clone()),
            version: self.latest.version + 1,
            root,
        });
        debug!(
            version = snapshot.version,
            writes = self.writes,
            root = %snapshot.root_hex(),
            "committed store version"
        );
        self.writes = 0;
        self.versions.insert(snapshot.version, snapshot.clone());
        self.latest = snapshot.clone();
        snapshot
    }

    fn record(&mut self, tag: u8, key: &[u8], value: Option<&[u8]>) {
        self.log.update([tag]);
        self.log.update((key.len() as u32).to_be_bytes());
        self.log.update(key);
        if let Some(value) = value {
            self.log.update((value.len() as u32).to_be_bytes());
            self.log.update(value);
        }
        self.writes += 1;
    }
}

impl StoreWriter for MemoryTree {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.record(TAG_SET, key, Some(value));
        self.working.insert(key.to_vec(), value.to_vec());
    }

    fn remove(&mut self, key: &[u8]) {
        self.record(TAG_REMOVE, key, None);
        self.working.remove(key);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
