//! Arbitrary-precision amount helpers.
//!
//! Reserves and order volumes are unbounded non-negative integers
//! ([`BigUint`]). Persisted records hold them as 32-byte big-endian words;
//! the export schema renders them as decimal strings.

use num_bigint::BigUint;
use num_traits::Zero;

/// Non-negative coin amount
pub type Amount = BigUint;

/// Width of a persisted amount word in bytes
pub const WORD_LEN: usize = 32;

/// Encode an amount as a big-endian 32-byte word.
///
/// # Returns
///
/// * `Some(word)` - The encoded amount
/// * `None` - If the amount needs more than 256 bits
pub fn to_word(amount: &BigUint) -> Option<[u8; WORD_LEN]> {
    let bytes = amount.to_bytes_be();
    if bytes.len() > WORD_LEN {
        return None;
    }
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - bytes.len()..].copy_from_slice(&bytes);
    Some(word)
}

/// Decode a big-endian 32-byte word
pub fn from_word(word: &[u8; WORD_LEN]) -> BigUint {
    BigUint::from_bytes_be(word)
}

/// `ceil(numerator / denominator)`
///
/// # Panics
///
/// Panics if `denominator` is zero.
pub fn ceil_div(numerator: &BigUint, denominator: &BigUint) -> BigUint {
    assert!(!denominator.is_zero(), "division by zero");
    let quotient = numerator / denominator;
    if (&quotient * denominator) == *numerator {
        quotient
    } else {
        quotient + 1u32
    }
}

/// Serde adapter rendering a [`BigUint`] as a decimal string.
///
/// ```
/// use hybrid_swap::types::amount::decimal;
/// use num_bigint::BigUint;
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Volume {
///     #[serde(with = "decimal")]
///     value: BigUint,
/// }
///
/// let json = serde_json::to_string(&Volume { value: BigUint::from(10u32).pow(20) }).unwrap();
/// assert_eq!(json, r#"{"value":"100000000000000000000"}"#);
/// ```
pub mod decimal {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_roundtrip() {
        let amount = BigUint::from(10u32).pow(22) + 7u32;
        let word = to_word(&amount).unwrap();
        assert_eq!(from_word(&word), amount);
        assert_eq!(to_word(&BigUint::zero()), Some([0u8; WORD_LEN]));
    }

    #[test]
    fn test_word_overflow() {
        let max = (BigUint::from(1u32) << 256u32) - 1u32;
        assert!(to_word(&max).is_some());
        assert!(to_word(&(max + 1u32)).is_none());
    }

    #[test]
    fn test_ceil_div() {
        let n = |v: u32| BigUint::from(v);
        assert_eq!(ceil_div(&n(10), &n(5)), n(2));
        assert_eq!(ceil_div(&n(11), &n(5)), n(3));
        assert_eq!(ceil_div(&n(0), &n(5)), n(0));
        assert_eq!(ceil_div(&n(1), &n(1001)), n(1));
    }
}
