//! Slippage tolerance and minimum-acceptable output.

use crate::amount::{self, ScaledAmount};
use crate::u256::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 10 000 basis points = 100 %.
pub const BASIS_POINTS: u64 = 10_000;
/// Default tolerance, 0.5 %.
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;
/// Upper sanity cap, 50 %.
pub const MAX_SLIPPAGE_BPS: u16 = 5_000;
/// Tolerances offered as one-click presets.
pub const SLIPPAGE_PRESETS: [u16; 3] = [10, 50, 100];
/// Tolerances above this are flagged to the user.
pub const HIGH_SLIPPAGE_BPS: u16 = 100;

/// Errors raised when constructing a tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlippageError {
    #[error("slippage tolerance must be between 1 and 5000 bps, got {0}")]
    /// Value outside `1..=5000`.
    OutOfRange(u64),
}

/// Slippage tolerance in basis points, always within `1..=5000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct SlippageTolerance(u16);

impl SlippageTolerance {
    /// Validates a basis-point value.
    pub fn new(bps: u64) -> Result<Self, SlippageError> {
        if bps == 0 || bps > u64::from(MAX_SLIPPAGE_BPS) {
            return Err(SlippageError::OutOfRange(bps));
        }
        Ok(Self(bps as u16))
    }

    /// Basis points.
    #[inline]
    pub fn bps(&self) -> u16 {
        self.0
    }

    /// Interprets custom percent text such as `"0.75"`.
    ///
    /// The percent is converted to basis points rounding half up and capped
    /// at 50 %.  Returns `None` when the text is not a strictly positive
    /// number, in which case the caller keeps its current tolerance.
    pub fn from_percent_input(text: &str) -> Option<Self> {
        // Thousandths of a percent, so one extra digit drives the rounding.
        let milli = amount::parse(text, 3).raw();
        if milli.is_zero() {
            return None;
        }
        let cap = U256::from(u64::from(MAX_SLIPPAGE_BPS));
        let bps = (milli.saturating_add(U256::from(5u64)) / U256::from(10u64)).min(cap);
        let bps = bps.to_u64().unwrap_or(u64::from(MAX_SLIPPAGE_BPS)).max(1);
        Self::new(bps).ok()
    }

    /// Whether the tolerance is large enough to warn about.
    pub fn is_high(&self) -> bool {
        self.0 > HIGH_SLIPPAGE_BPS
    }

    /// Whether this tolerance is one of the presets.
    pub fn is_preset(&self) -> bool {
        SLIPPAGE_PRESETS.contains(&self.0)
    }
}

impl Default for SlippageTolerance {
    fn default() -> Self {
        Self(DEFAULT_SLIPPAGE_BPS)
    }
}

impl TryFrom<u64> for SlippageTolerance {
    type Error = SlippageError;

    fn try_from(bps: u64) -> Result<Self, Self::Error> {
        Self::new(bps)
    }
}

impl From<SlippageTolerance> for u64 {
    fn from(value: SlippageTolerance) -> Self {
        u64::from(value.0)
    }
}

impl fmt::Display for SlippageTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::format::format_percent(u64::from(self.0)))
    }
}

/// Lowest output the settlement layer may deliver for a quoted amount:
/// `quoted * (10000 - bps) / 10000`, truncated.
///
/// The product is split as `q * 10000 + r` so it never overflows 256 bits.
///
/// ```
/// use usdx_client::{amount::ScaledAmount, slippage::{min_acceptable, SlippageTolerance}};
///
/// let quoted = ScaledAmount::from_units(1000, 18);
/// let floor = min_acceptable(quoted, SlippageTolerance::default());
/// assert_eq!(floor, ScaledAmount::from_units(995, 18));
/// ```
pub fn min_acceptable(quoted: ScaledAmount, tolerance: SlippageTolerance) -> ScaledAmount {
    let base = U256::from(BASIS_POINTS);
    let keep = U256::from(BASIS_POINTS - u64::from(tolerance.bps()));
    let raw = quoted.raw();
    let (q, r) = (raw / base, raw % base);
    ScaledAmount::from_raw(q * keep + (r * keep) / base)
}
