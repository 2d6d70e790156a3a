//! Key layout of the swap namespace.
//!
//! | Record | Key |
//! |--------|-----|
//! | Pair reserves and id | `s p <coin0 BE4> <coin1 BE4>` |
//! | Order | `s o <id BE4>` |
//! | Price index entry | `s i <coin0> <coin1> <side> <price 21B> <id BE4>` |
//! | Next pool id | `s n` |
//! | Next order id | `s c` |
//!
//! Index entries have empty values and sort best order first within a side:
//! ascending sort price, then ascending id.

use crate::types::price::PRICE_BYTES;
use crate::types::{PairKey, Price, Side};

/// Namespace byte of all swap records
pub const NAMESPACE: u8 = b's';

const PAIR: u8 = b'p';
const ORDER: u8 = b'o';
const INDEX: u8 = b'i';
const NEXT_POOL_ID: u8 = b'n';
const NEXT_ORDER_ID: u8 = b'c';

const PAIR_KEY_LEN: usize = 2 + 8;
const INDEX_PREFIX_LEN: usize = 2 + 8 + 1;

/// Key of a pair record
pub fn pair(pair: &PairKey) -> Vec<u8> {
    let mut key = Vec::with_capacity(PAIR_KEY_LEN);
    key.extend_from_slice(&[NAMESPACE, PAIR]);
    key.extend_from_slice(&pair.to_bytes());
    key
}

/// Prefix of all pair records
pub fn pairs_prefix() -> [u8; 2] {
    [NAMESPACE, PAIR]
}

/// Canonical pair of a pair record key
pub fn parse_pair(key: &[u8]) -> Option<PairKey> {
    if key.len() != PAIR_KEY_LEN || key[..2] != pairs_prefix() {
        return None;
    }
    PairKey::from_bytes(&key[2..])
}

/// Key of an order record
pub fn order(id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(6);
    key.extend_from_slice(&[NAMESPACE, ORDER]);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Prefix of all order records
pub fn orders_prefix() -> [u8; 2] {
    [NAMESPACE, ORDER]
}

/// Order id of an order record key
pub fn parse_order(key: &[u8]) -> Option<u32> {
    if key.len() != 6 || key[..2] != orders_prefix() {
        return None;
    }
    Some(u32::from_be_bytes(key[2..].try_into().ok()?))
}

/// Prefix of one side of a pair's price index
pub fn index_prefix(pair: &PairKey, side: Side) -> Vec<u8> {
    let mut key = Vec::with_capacity(INDEX_PREFIX_LEN);
    key.extend_from_slice(&[NAMESPACE, INDEX]);
    key.extend_from_slice(&pair.to_bytes());
    key.push(side.to_u8());
    key
}

/// Key of an order's price index entry
pub fn index(pair: &PairKey, side: Side, price: &Price, id: u32) -> Vec<u8> {
    let mut key = index_prefix(pair, side);
    key.extend_from_slice(&price.to_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// `(price, id)` of a price index key
pub fn parse_index(key: &[u8]) -> Option<(Price, u32)> {
    if key.len() != INDEX_PREFIX_LEN + PRICE_BYTES + 4 {
        return None;
    }
    let price = Price::from_bytes(&key[INDEX_PREFIX_LEN..INDEX_PREFIX_LEN + PRICE_BYTES])?;
    let id = u32::from_be_bytes(key[INDEX_PREFIX_LEN + PRICE_BYTES..].try_into().ok()?);
    Some((price, id))
}

/// Key of the next pool id counter
pub fn next_pool_id() -> [u8; 2] {
    [NAMESPACE, NEXT_POOL_ID]
}

/// Key of the next order id counter
pub fn next_order_id() -> [u8; 2] {
    [NAMESPACE, NEXT_ORDER_ID]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn price(n: u32, d: u32) -> Price {
        Price::from_ratio(&BigUint::from(n), &BigUint::from(d))
    }

    #[test]
    fn test_pair_key_roundtrip() {
        let key = PairKey::new(1, 2);
        assert_eq!(parse_pair(&pair(&key)), Some(key));
        assert_eq!(parse_pair(&order(5)), None);
    }

    #[test]
    fn test_order_key_roundtrip() {
        assert_eq!(parse_order(&order(0xDEAD)), Some(0xDEAD));
        assert_eq!(parse_order(&next_order_id()), None);
    }

    #[test]
    fn test_index_key_orders_by_price_then_id() {
        let pair = PairKey::new(1, 2);
        let a = index(&pair, Side::Sell, &price(1, 3), 9);
        let b = index(&pair, Side::Sell, &price(1, 2), 1);
        let c = index(&pair, Side::Sell, &price(1, 2), 2);
        assert!(a < b && b < c);
        assert!(a.starts_with(&index_prefix(&pair, Side::Sell)));
        assert_eq!(parse_index(&c), Some((price(1, 2), 2)));
    }

    #[test]
    fn test_sides_do_not_overlap() {
        let pair = PairKey::new(1, 2);
        let buy = index(&pair, Side::Buy, &price(1000, 1), 1);
        assert!(!buy.starts_with(&index_prefix(&pair, Side::Sell)));
    }
}
