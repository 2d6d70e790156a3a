//! Coin, owner address and pair identity.
//!
//! ## Canonical Orientation
//!
//! A pair of coins has exactly one canonical ("sorted") orientation: the coin
//! with the smaller id comes first. Every persisted record is keyed by the
//! canonical [`PairKey`]; a lookup in the opposite orientation is served by a
//! reversed view over the same state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// CoinId
// ============================================================================

/// Identifier of a coin registered on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinId(pub u32);

impl CoinId {
    /// Raw numeric id
    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Big-endian bytes, as used in store keys
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<u32> for CoinId {
    fn from(value: u32) -> Self {
        CoinId(value)
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Address
// ============================================================================

/// Length of an account address in bytes
pub const ADDRESS_LEN: usize = 20;

/// 20-byte account address of an order owner or liquidity provider.
///
/// Rendered and parsed as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Build an address from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Left-aligned, zero-padded into a 32-byte word for SSZ records.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[..ADDRESS_LEN].copy_from_slice(&self.0);
        word
    }

    /// Inverse of [`Address::to_word`]; the padding bytes are ignored.
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&word[..ADDRESS_LEN]);
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// PairKey
// ============================================================================

/// Ordered pair of coins.
///
/// `coin0` is the coin the taker sells and `coin1` the coin it receives when
/// the key is used as a trading direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PairKey {
    pub coin0: CoinId,
    pub coin1: CoinId,
}

impl PairKey {
    pub fn new(coin0: impl Into<CoinId>, coin1: impl Into<CoinId>) -> Self {
        Self {
            coin0: coin0.into(),
            coin1: coin1.into(),
        }
    }

    /// True when the key is in canonical orientation
    #[inline]
    pub fn is_sorted(&self) -> bool {
        self.coin0 < self.coin1
    }

    /// Same coins, opposite orientation
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            coin0: self.coin1,
            coin1: self.coin0,
        }
    }

    /// Canonical orientation of this key
    pub fn sorted(&self) -> Self {
        if self.is_sorted() {
            *self
        } else {
            self.reversed()
        }
    }

    /// True when both sides name the same coin
    #[inline]
    pub fn is_identical(&self) -> bool {
        self.coin0 == self.coin1
    }

    /// Key bytes: `coin0 || coin1`, both big-endian.
    ///
    /// Byte order over canonical keys is the commit order of dirty pairs.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.coin0.to_be_bytes());
        bytes[4..].copy_from_slice(&self.coin1.to_be_bytes());
        bytes
    }

    /// Inverse of [`PairKey::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 8 {
            return None;
        }
        let coin0 = u32::from_be_bytes(bytes[..4].try_into().ok()?);
        let coin1 = u32::from_be_bytes(bytes[4..].try_into().ok()?);
        Some(Self::new(coin0, coin1))
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.coin0, self.coin1)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
