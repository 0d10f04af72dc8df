//! 256-bit unsigned integer backing every scaled amount.
//!
//! The settlement layer stores balances, quotes and timestamps as EVM
//! `uint256` words, so amounts are carried in the same width end to end.

// Allow clippy warnings from the uint crate's construct_uint macro
#![allow(clippy::manual_div_ceil)]
#![allow(clippy::assign_op_pattern)]
#![allow(missing_docs)]

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer.
    ///
    /// Used for:
    /// - Scaled token amounts (ETH and USDX, 18 decimals)
    /// - Quote and fee values returned by the bonding curve
    /// - Raw `uint256` words decoded from contract reads
    pub struct U256(4);
}

impl U256 {
    /// Decode a 32-byte big-endian word.
    #[inline]
    pub fn from_word(word: &[u8; 32]) -> Self {
        U256::from_big_endian(word)
    }

    /// Encode as a 32-byte big-endian word.
    #[inline]
    pub fn to_word(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.to_big_endian(&mut out);
        out
    }

    /// Convert to u64, returning None if the value doesn't fit.
    #[inline]
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[1] == 0 && self.0[2] == 0 && self.0[3] == 0 {
            Some(self.0[0])
        } else {
            None
        }
    }

    /// Convert to u64, saturating at `u64::MAX`.
    #[inline]
    pub fn saturating_u64(&self) -> u64 {
        self.to_u64().unwrap_or(u64::MAX)
    }
}

// Serialize as a decimal string so JSON consumers never see lossy floats.
impl Serialize for U256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(|e| serde::de::Error::custom(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_round_trip_preserves_value() {
        let value = U256::from(1_000_000_000_000_000_000u64) * U256::from(995u64);
        assert_eq!(U256::from_word(&value.to_word()), value);
    }

    #[test]
    fn to_u64_rejects_wide_values() {
        assert_eq!(U256::from(42u64).to_u64(), Some(42));
        assert_eq!((U256::from(u64::MAX) + U256::one()).to_u64(), None);
        assert_eq!(U256::MAX.saturating_u64(), u64::MAX);
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let value = U256::from(12345u64);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"12345\"");
        let back: U256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
