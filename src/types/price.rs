//! High-precision prices for ordering and display.
//!
//! ## Overview
//!
//! A [`Price`] is a binary floating-point number with a normalized 128-bit
//! mantissa (about 38 significant decimal digits). It is derived from two
//! integer amounts by truncating division, so the mapping from ratios to
//! prices is monotone: if `a/b <= c/d` then `Price::from_ratio(a, b) <=
//! Price::from_ratio(c, d)`.
//!
//! Prices only order orders in the book and render values in logs and
//! errors. They never determine a settled amount; settlement math works on
//! the underlying integers.
//!
//! ## Encoding
//!
//! [`Price::to_bytes`] produces 21 bytes whose lexicographic order equals the
//! numeric order, so prices can be embedded in store keys of a sorted index.
//!
//! ## Examples
//!
//! ```
//! use hybrid_swap::types::price::Price;
//! use num_bigint::BigUint;
//!
//! let third = Price::from_ratio(&BigUint::from(1u32), &BigUint::from(3u32));
//! let half = Price::from_ratio(&BigUint::from(1u32), &BigUint::from(2u32));
//! assert!(third < half);
//! assert!(third.to_bytes() < half.to_bytes());
//! assert_eq!(half.to_string(), "0.5");
//! ```

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;

/// Mantissa width in bits
pub const MANTISSA_BITS: u64 = 128;

/// Encoded width of a price in bytes
pub const PRICE_BYTES: usize = 21;

/// Largest significand rust_decimal can hold (2^96 - 1)
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Maximum number of fractional digits rendered
const DECIMAL_MAX_SCALE: u32 = 28;

// ============================================================================
// Price
// ============================================================================

/// Non-negative price `mantissa * 2^exponent`.
///
/// Non-zero prices keep the top mantissa bit set, which makes the
/// representation unique and comparison a plain `(exponent, mantissa)`
/// lexicographic check.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Price {
    mantissa: u128,
    exponent: i32,
}

impl Price {
    /// The zero price, used for empty ratios
    pub const ZERO: Price = Price {
        mantissa: 0,
        exponent: 0,
    };

    /// Price of `numerator / denominator`, truncated to 128 significant bits.
    ///
    /// Returns [`Price::ZERO`] when either side is zero.
    pub fn from_ratio(numerator: &BigUint, denominator: &BigUint) -> Self {
        if numerator.is_zero() || denominator.is_zero() {
            return Price::ZERO;
        }

        // Scale so the quotient lands in [2^127, 2^129).
        let mut shift = MANTISSA_BITS as i64 + denominator.bits() as i64 - numerator.bits() as i64;
        let mut quotient = if shift >= 0 {
            (numerator << shift as u64) / denominator
        } else {
            numerator / (denominator << (-shift) as u64)
        };
        if quotient.bits() > MANTISSA_BITS {
            quotient >>= 1u32;
            shift -= 1;
        }

        let mantissa = match quotient.to_u128() {
            Some(m) => m,
            None => unreachable!("normalized quotient exceeds 128 bits"),
        };
        Price {
            mantissa,
            exponent: -shift as i32,
        }
    }

    /// True for the zero price
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Order-preserving fixed-width encoding.
    ///
    /// Layout: `[non-zero flag][biased exponent, BE u32][mantissa, BE u128]`.
    pub fn to_bytes(&self) -> [u8; PRICE_BYTES] {
        let mut bytes = [0u8; PRICE_BYTES];
        if self.is_zero() {
            return bytes;
        }
        bytes[0] = 1;
        let biased = (self.exponent as u32) ^ 0x8000_0000;
        bytes[1..5].copy_from_slice(&biased.to_be_bytes());
        bytes[5..].copy_from_slice(&self.mantissa.to_be_bytes());
        bytes
    }

    /// Inverse of [`Price::to_bytes`]
    ///
    /// # Returns
    ///
    /// * `None` - If the slice has the wrong length or is not normalized
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PRICE_BYTES {
            return None;
        }
        match bytes[0] {
            0 => bytes[1..].iter().all(|b| *b == 0).then_some(Price::ZERO),
            1 => {
                let biased = u32::from_be_bytes(bytes[1..5].try_into().ok()?);
                let mantissa = u128::from_be_bytes(bytes[5..].try_into().ok()?);
                if mantissa >> 127 != 1 {
                    return None;
                }
                Some(Price {
                    mantissa,
                    exponent: (biased ^ 0x8000_0000) as i32,
                })
            }
            _ => None,
        }
    }

    /// Decimal rendering with up to 28 significant digits.
    ///
    /// # Returns
    ///
    /// * `None` - If the integer part does not fit a `Decimal`
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.is_zero() {
            return Some(Decimal::ZERO);
        }
        let mantissa = BigUint::from(self.mantissa);
        let mut scale = DECIMAL_MAX_SCALE;
        loop {
            let scaled = mantissa.clone() * BigUint::from(10u32).pow(scale);
            let value = if self.exponent >= 0 {
                scaled << self.exponent as u32
            } else {
                scaled >> self.exponent.unsigned_abs()
            };
            match value.to_u128() {
                Some(v) if v <= DECIMAL_MAX_MANTISSA => {
                    let decimal = Decimal::try_from_i128_with_scale(v as i128, scale).ok()?;
                    return Some(decimal.normalize());
                }
                _ if scale == 0 => return None,
                _ => scale -= 1,
            }
        }
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_zero(), other.is_zero()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .exponent
                .cmp(&other.exponent)
                .then(self.mantissa.cmp(&other.mantissa)),
        }
    }
}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(decimal) => write!(f, "{}", decimal),
            None => write!(f, "{}*2^{}", self.mantissa, self.exponent),
        }
    }
}

impl fmt::Debug for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Price({})", self)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
