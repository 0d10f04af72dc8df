//! Exact decimal amounts.
//!
//! User-typed decimal strings are converted to [`ScaledAmount`] values, i.e.
//! integers scaled by `10^decimals`, without ever passing through a floating
//! point number.  The codec is deliberately forgiving: anything it cannot
//! interpret becomes the zero amount, and the stricter [`AmountInput`] gate
//! keeps most malformed text from reaching it in the first place.

use crate::u256::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal precision used by both ETH and USDX.
pub const DEFAULT_DECIMALS: u32 = 18;

/// Largest supported precision; `10^36` times any realistic whole amount
/// still fits in 256 bits.
pub const MAX_DECIMALS: u32 = 36;

/// Values strictly below `10^-4` are rendered in exponential notation.
const EXPONENTIAL_BELOW_DIGITS: u32 = 4;

/// Non-negative decimal quantity stored as an integer scaled by `10^d`.
///
/// The scale `d` is not stored; callers pass it to every codec function,
/// mirroring how the settlement layer exposes raw `uint256` balances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ScaledAmount(U256);

impl ScaledAmount {
    /// The zero amount.
    #[inline]
    pub fn zero() -> Self {
        ScaledAmount(U256::zero())
    }

    /// Wraps a raw scaled integer read from the settlement layer.
    #[inline]
    pub fn from_raw(raw: U256) -> Self {
        ScaledAmount(raw)
    }

    /// Scales a whole number of units, saturating at the 256-bit maximum.
    pub fn from_units(units: u64, decimals: u32) -> Self {
        let scaled = U256::from(units)
            .checked_mul(pow10(decimals))
            .unwrap_or(U256::MAX);
        ScaledAmount(scaled)
    }

    /// Returns the raw scaled integer.
    #[inline]
    pub fn raw(&self) -> U256 {
        self.0
    }

    /// Returns true for the zero amount.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(ScaledAmount)
    }

    /// Subtracts `other`, flooring at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        ScaledAmount(self.0.saturating_sub(other.0))
    }

    /// Plain decimal rendering: no grouping, no truncation, trailing
    /// fractional zeros and a dangling point removed (`"1.5"`, `"42"`).
    pub fn to_plain_string(&self, decimals: u32) -> String {
        let (whole, frac) = split_digits(self.0, decimals.min(MAX_DECIMALS));
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            whole
        } else {
            format!("{whole}.{frac}")
        }
    }
}

impl fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<U256> for ScaledAmount {
    fn from(raw: U256) -> Self {
        ScaledAmount(raw)
    }
}

/// `10^exp` as a 256-bit integer.
#[inline]
pub(crate) fn pow10(exp: u32) -> U256 {
    U256::exp10(exp.min(MAX_DECIMALS) as usize)
}

/// Parses a user-entered decimal string into a scaled amount.
///
/// Commas and whitespace are stripped first.  Empty input, a leading sign
/// (`"-5"` and also `"+5"`), exponent markers and malformed numerals all
/// yield zero.  A trailing point
/// (`"1."`) and a leading point (`".5"`) are accepted.  Fractional digits past
/// `decimals` are truncated, never rounded.
///
/// ```
/// use usdx_client::amount::{parse, ScaledAmount};
///
/// assert_eq!(parse("1,000.5", 18), parse("1000.5", 18));
/// assert_eq!(parse("1e18", 18), ScaledAmount::zero());
/// assert_eq!(parse("+5", 18), ScaledAmount::zero());
/// assert_eq!(parse("1", 6).raw().as_u64(), 1_000_000);
/// ```
pub fn parse(input: &str, decimals: u32) -> ScaledAmount {
    if input.trim().is_empty() {
        return ScaledAmount::zero();
    }
    let cleaned: String = input
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.contains(['e', 'E']) || cleaned.starts_with('-') {
        return ScaledAmount::zero();
    }
    parse_cleaned(&cleaned, decimals.min(MAX_DECIMALS)).unwrap_or_default()
}

fn parse_cleaned(cleaned: &str, decimals: u32) -> Option<ScaledAmount> {
    let (whole, frac) = match cleaned.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (cleaned, ""),
    };
    if !is_digits(whole) || !is_digits(frac) {
        return None;
    }
    // Digits are ASCII, so byte slicing is char slicing.
    let frac = &frac[..frac.len().min(decimals as usize)];

    let whole_value = digits_value(whole)?;
    let scaled_whole = whole_value.checked_mul(pow10(decimals))?;
    let frac_value = digits_value(frac)?.checked_mul(pow10(decimals - frac.len() as u32))?;
    scaled_whole.checked_add(frac_value).map(ScaledAmount)
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn digits_value(digits: &str) -> Option<U256> {
    if digits.is_empty() {
        return Some(U256::zero());
    }
    U256::from_dec_str(digits).ok()
}

/// Renders an amount for display.
///
/// Whole digits are grouped with commas, at most `max_display_decimals`
/// fractional digits are kept (truncated), and trailing zeros are dropped.
/// Non-zero values below `1e-4` switch to three-significant-digit
/// exponential form (`"1.00e-5"`).  Zero renders as `"0"`.
pub fn format(amount: ScaledAmount, decimals: u32, max_display_decimals: u32) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }
    let decimals = decimals.min(MAX_DECIMALS);
    if decimals >= EXPONENTIAL_BELOW_DIGITS
        && amount.raw() < pow10(decimals - EXPONENTIAL_BELOW_DIGITS)
    {
        return exponential(amount.raw(), decimals);
    }

    let (whole, frac) = split_digits(amount.raw(), decimals);
    let keep = max_display_decimals.min(decimals) as usize;
    let frac = frac[..keep].trim_end_matches('0');
    let grouped = group_thousands(&whole);
    if frac.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac}")
    }
}

/// Splits a raw value into its whole digits and a zero-padded fractional
/// string exactly `decimals` wide.
pub(crate) fn split_digits(raw: U256, decimals: u32) -> (String, String) {
    let digits = raw.to_string();
    let d = decimals as usize;
    if digits.len() > d {
        let (whole, frac) = digits.split_at(digits.len() - d);
        (whole.to_string(), frac.to_string())
    } else {
        ("0".to_string(), format!("{digits:0>d$}"))
    }
}

fn exponential(raw: U256, decimals: u32) -> String {
    let digits = raw.to_string();
    let exponent = digits.len() as i64 - 1 - i64::from(decimals);
    let mantissa: String = format!("{digits:0<3}").chars().take(3).collect();
    format!("{}.{}e{exponent}", &mantissa[..1], &mantissa[1..])
}

/// Inserts a comma every three digits from the right.
pub(crate) fn group_thousands(whole: &str) -> String {
    let mut out = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Returns true if `candidate` may replace the current input text: it is
/// empty, or digits with at most one decimal point and no more than
/// `decimals` fractional digits.
pub fn accepts_keystroke(candidate: &str, decimals: u32) -> bool {
    if candidate.is_empty() {
        return true;
    }
    let mut dots = 0usize;
    for ch in candidate.chars() {
        match ch {
            '.' => dots += 1,
            c if c.is_ascii_digit() => {}
            _ => return false,
        }
    }
    if dots > 1 {
        return false;
    }
    match candidate.split_once('.') {
        Some((_, frac)) => frac.len() <= decimals as usize,
        None => true,
    }
}

/// Text state of an amount input field.
///
/// Every proposed edit goes through [`accepts_keystroke`]; rejected edits
/// leave the previously accepted text in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountInput {
    value: String,
    decimals: u32,
}

impl AmountInput {
    /// Creates an empty input for a token with the given precision.
    pub fn new(decimals: u32) -> Self {
        Self {
            value: String::new(),
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    /// The currently accepted text.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Proposes new text; returns whether it was accepted.
    pub fn apply(&mut self, candidate: &str) -> bool {
        if !accepts_keystroke(candidate, self.decimals) {
            return false;
        }
        self.value.clear();
        self.value.push_str(candidate);
        true
    }

    /// Clears the field.
    pub fn clear(&mut self) {
        self.value.clear();
    }

    /// Fills the field with an entire balance; a zero balance is ignored.
    pub fn fill_max(&mut self, balance: ScaledAmount) {
        if balance.is_zero() {
            return;
        }
        self.value = balance.to_plain_string(self.decimals);
    }

    /// The scaled amount the current text represents.
    pub fn amount(&self) -> ScaledAmount {
        parse(&self.value, self.decimals)
    }
}

impl Default for AmountInput {
    fn default() -> Self {
        Self::new(DEFAULT_DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn units(n: u64) -> ScaledAmount {
        ScaledAmount::from_units(n, DEFAULT_DECIMALS)
    }

    #[test]
    fn rejects_garbage_and_signs() {
        for input in ["abc", "-1", "1e18", "1E18", "", "   ", "+5", "1.2.3", "0x10"] {
            assert_eq!(parse(input, 18), ScaledAmount::zero(), "input {input:?}");
        }
    }

    #[test]
    fn strips_separators_and_whitespace() {
        assert_eq!(parse("1,000.5", 18), parse("1000.5", 18));
        assert_eq!(parse(" 100 ", 18), units(100));
    }

    #[test]
    fn leading_and_trailing_points() {
        assert_eq!(parse(".5", 18), parse("0.5", 18));
        assert_eq!(parse("1.", 18), parse("1", 18));
        assert_eq!(parse("1.", 18), units(1));
    }

    #[test]
    fn truncates_excess_fraction() {
        let long = format!("1.{}", "1".repeat(20));
        let capped = format!("1.{}", "1".repeat(18));
        assert_eq!(parse(&long, 18), parse(&capped, 18));
        assert_eq!(parse("0.19", 1), parse("0.1", 1));
    }

    #[test]
    fn custom_decimals() {
        assert_eq!(parse("1", 6).raw(), U256::from(1_000_000u64));
        assert_eq!(parse("1.5", 18).raw(), U256::from(1_500_000_000_000_000_000u64));
    }

    #[test]
    fn overflow_parses_to_zero() {
        let huge = "9".repeat(80);
        assert_eq!(parse(&huge, 18), ScaledAmount::zero());
    }

    #[test]
    fn format_basics() {
        assert_eq!(format(ScaledAmount::zero(), 18, 4), "0");
        assert_eq!(format(units(1_234_567), 18, 4), "1,234,567");
        assert_eq!(format(parse("1.1", 18), 18, 4), "1.1");
        assert_eq!(format(parse("1.23456789", 18), 18, 4), "1.2345");
        assert_eq!(format(parse("990.1234", 18), 18, 2), "990.12");
        assert_eq!(format(parse("1000", 18), 18, 0), "1,000");
    }

    #[test]
    fn format_small_values_exponential() {
        assert_eq!(format(parse("0.00001", 18), 18, 4), "1.00e-5");
        assert_eq!(format(parse("0.0000123456", 18), 18, 4), "1.23e-5");
        assert_eq!(format(ScaledAmount::from_raw(U256::one()), 18, 4), "1.00e-18");
        assert_eq!(format(parse("0.0001", 18), 18, 4), "0.0001");
    }

    #[test]
    fn plain_string_trims_zeros() {
        assert_eq!(parse("1.500000", 18).to_plain_string(18), "1.5");
        assert_eq!(units(42).to_plain_string(18), "42");
        assert_eq!(parse("0.000000000000000001", 18).to_plain_string(18), "0.000000000000000001");
    }

    #[test]
    fn keystroke_gate() {
        assert!(accepts_keystroke("", 18));
        assert!(accepts_keystroke("12.", 18));
        assert!(accepts_keystroke(".", 18));
        assert!(!accepts_keystroke("1.2.", 18));
        assert!(!accepts_keystroke("1,000", 18));
        assert!(!accepts_keystroke("-1", 18));
        assert!(!accepts_keystroke("1.123", 2));
    }

    #[test]
    fn input_keeps_previous_value_on_rejection() {
        let mut input = AmountInput::new(18);
        assert!(input.apply("1.5"));
        assert!(!input.apply("1.5."));
        assert_eq!(input.value(), "1.5");
        let too_long = format!("1.{}", "1".repeat(19));
        assert!(!input.apply(&too_long));
        assert_eq!(input.amount(), parse("1.5", 18));
    }

    #[test]
    fn fill_max_ignores_zero_balance() {
        let mut input = AmountInput::default();
        input.fill_max(ScaledAmount::zero());
        assert_eq!(input.value(), "");
        input.fill_max(parse("12.340", 18));
        assert_eq!(input.value(), "12.34");
    }

    proptest! {
        #[test]
        fn format_of_parse_is_truncated_input(whole in 1u64..1_000_000_000_000u64, frac in "[0-9]{0,18}") {
            let text = format!("{whole}.{frac}");
            let rendered = format(parse(&text, 18), 18, 18).replace(',', "");
            let trimmed = frac.trim_end_matches('0');
            let expected = if trimmed.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{trimmed}")
            };
            prop_assert_eq!(rendered, expected);
        }

        #[test]
        fn parse_is_idempotent_on_own_output(raw in any::<u128>()) {
            let amount = ScaledAmount::from_raw(U256::from(raw));
            prop_assert_eq!(parse(&amount.to_plain_string(18), 18), amount);
        }

        #[test]
        fn excess_digits_never_round_up(whole in 0u64..1_000_000u64, frac in "[0-9]{18}", extra in "[0-9]{1,6}") {
            let exact = parse(&format!("{whole}.{frac}"), 18);
            let longer = parse(&format!("{whole}.{frac}{extra}"), 18);
            prop_assert_eq!(exact, longer);
        }
    }
}
