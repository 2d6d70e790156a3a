//! SSZ records persisted by the engine.
//!
//! ## SSZ Serialization
//!
//! Records derive `SimpleSerialize` from ssz_rs and are fixed-size
//! containers, so every node produces identical bytes for identical state.
//! Amounts occupy 32-byte big-endian words; an amount wider than 256 bits
//! cannot be persisted and fails the commit.
//!
//! Decoding failures mean the store is corrupted; the decoders return `None`
//! and callers treat that as fatal.

use num_bigint::BigUint;
use ssz_rs::prelude::*;

use crate::error::StoreError;
use crate::store::{keys, Snapshot};
use crate::types::amount::{from_word, to_word};
use crate::types::{Address, LimitOrder, PairKey, Side};

/// Reserves and pool id of a pair.
///
/// ## SSZ Layout
///
/// 32 + 32 + 4 = 68 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct PairRecord {
    pub reserve0: [u8; 32],
    pub reserve1: [u8; 32],
    pub id: u32,
}

/// A resting limit order.
///
/// ## SSZ Layout
///
/// 4 + 4 + 1 + 32 + 32 + 32 + 8 = 113 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct OrderRecord {
    pub coin0: u32,
    pub coin1: u32,
    /// Side as u8 (0=Buy, 1=Sell)
    pub side_raw: u8,
    pub owner: [u8; 32],
    pub want_buy: [u8; 32],
    pub want_sell: [u8; 32],
    pub height: u64,
}

fn word(field: &'static str, amount: &BigUint) -> Result<[u8; 32], StoreError> {
    to_word(amount).ok_or_else(|| StoreError::AmountOverflow {
        field,
        amount: amount.clone(),
    })
}

fn encode<T: SimpleSerialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    ssz_rs::serialize(record).map_err(|err| StoreError::Encode(format!("{:?}", err)))
}

/// Encode a pair record
pub fn encode_pair(reserve0: &BigUint, reserve1: &BigUint, id: u32) -> Result<Vec<u8>, StoreError> {
    encode(&PairRecord {
        reserve0: word("reserve0", reserve0)?,
        reserve1: word("reserve1", reserve1)?,
        id,
    })
}

/// Decode a pair record into `(reserve0, reserve1, id)`
pub fn decode_pair(bytes: &[u8]) -> Option<(BigUint, BigUint, u32)> {
    let record: PairRecord = ssz_rs::deserialize(bytes).ok()?;
    Some((from_word(&record.reserve0), from_word(&record.reserve1), record.id))
}

/// Encode an order record
pub fn encode_order(order: &LimitOrder) -> Result<Vec<u8>, StoreError> {
    encode(&OrderRecord {
        coin0: order.pair.coin0.value(),
        coin1: order.pair.coin1.value(),
        side_raw: order.side.to_u8(),
        owner: order.owner.to_word(),
        want_buy: word("want_buy", &order.want_buy)?,
        want_sell: word("want_sell", &order.want_sell)?,
        height: order.height,
    })
}

/// Decode the order stored under `id`
pub fn decode_order(id: u32, bytes: &[u8]) -> Option<LimitOrder> {
    let record: OrderRecord = ssz_rs::deserialize(bytes).ok()?;
    let order = LimitOrder::new(
        id,
        PairKey::new(record.coin0, record.coin1),
        Side::from_u8(record.side_raw)?,
        Address::from_word(&record.owner),
        from_word(&record.want_buy),
        from_word(&record.want_sell),
        record.height,
    );
    Some(LimitOrder::from_store(order))
}

/// Encode a counter value
pub fn encode_counter(value: u32) -> Result<Vec<u8>, StoreError> {
    encode(&value)
}

/// Decode a counter value
pub fn decode_counter(bytes: &[u8]) -> Option<u32> {
    ssz_rs::deserialize(bytes).ok()
}

// ============================================================================
// Snapshot readers
// ============================================================================

/// Read a pair record.
///
/// # Panics
///
/// Panics if the stored bytes are not a valid record.
pub fn read_pair(snapshot: &dyn Snapshot, pair: &PairKey) -> Option<(BigUint, BigUint, u32)> {
    let bytes = snapshot.get(&keys::pair(pair))?;
    match decode_pair(&bytes) {
        Some(record) => Some(record),
        None => panic!("corrupted pair record {}", pair),
    }
}

/// Read an order record.
///
/// # Panics
///
/// Panics if the stored bytes are not a valid record.
pub fn read_order(snapshot: &dyn Snapshot, id: u32) -> Option<LimitOrder> {
    let bytes = snapshot.get(&keys::order(id))?;
    match decode_order(id, &bytes) {
        Some(order) => Some(order),
        None => panic!("corrupted order record {}", id),
    }
}

/// Read a counter, `None` when it was never written.
///
/// # Panics
///
/// Panics if the stored bytes are not a valid counter.
pub fn read_counter(snapshot: &dyn Snapshot, key: &[u8]) -> Option<u32> {
    let bytes = snapshot.get(key)?;
    match decode_counter(&bytes) {
        Some(value) => Some(value),
        None => panic!("corrupted counter {}", hex::encode(key)),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
