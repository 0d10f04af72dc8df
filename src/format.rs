//! Display helpers for amounts, ratios, addresses and durations.

use crate::amount::{self, group_thousands, pow10, split_digits, ScaledAmount, DEFAULT_DECIMALS};
use serde::Serialize;

/// Default display precision for ETH amounts.
pub const ETH_DISPLAY_DECIMALS: u32 = 4;
/// Default display precision for USDX amounts.
pub const USDX_DISPLAY_DECIMALS: u32 = 2;

/// `"1.2345 ETH"`, `"990.12 USDX"`.
pub fn format_token(amount: ScaledAmount, symbol: &str, max_decimals: u32) -> String {
    format!(
        "{} {symbol}",
        amount::format(amount, DEFAULT_DECIMALS, max_decimals)
    )
}

/// Formats an 18-decimal ETH amount with the default precision.
pub fn format_eth(amount: ScaledAmount) -> String {
    format_token(amount, "ETH", ETH_DISPLAY_DECIMALS)
}

/// Formats an 18-decimal USDX amount with the default precision.
pub fn format_usdx(amount: ScaledAmount) -> String {
    format_token(amount, "USDX", USDX_DISPLAY_DECIMALS)
}

/// `"$1,234.56"`: two fixed decimals, truncated.
pub fn format_usd(amount: ScaledAmount) -> String {
    let (whole, frac) = split_digits(amount.raw(), DEFAULT_DECIMALS);
    format!("${}.{}", group_thousands(&whole), &frac[..2])
}

/// `"$1.23K"`: compact notation with up to two decimals.
pub fn format_usd_compact(amount: ScaledAmount) -> String {
    const SUFFIXES: [(u32, &str); 4] = [(12, "T"), (9, "B"), (6, "M"), (3, "K")];
    for (exp, suffix) in SUFFIXES {
        let unit = pow10(DEFAULT_DECIMALS + exp);
        if amount.raw() >= unit {
            let scaled = ScaledAmount::from_raw(amount.raw() / pow10(exp));
            let text = amount::format(scaled, DEFAULT_DECIMALS, 2);
            return format!("${text}{suffix}");
        }
    }
    let text = amount::format(amount, DEFAULT_DECIMALS, 2);
    format!("${text}")
}

/// Formats a percentage given in hundredths of a percent: `1234` → `"12.34%"`.
pub fn format_percent(hundredths: u64) -> String {
    let whole = hundredths / 100;
    let frac = hundredths % 100;
    if frac == 0 {
        format!("{whole}%")
    } else {
        let frac = format!("{frac:02}");
        format!("{whole}.{}%", frac.trim_end_matches('0'))
    }
}

/// Health tier of a collateralization ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrTier {
    /// Comfortably over-collateralized.
    Success,
    /// Liquidation fees may apply soon.
    Warning,
    /// Under-collateralized.
    Error,
}

/// Rendered collateralization ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrDisplay {
    /// Text such as `"160%"`.
    pub text: String,
    /// Colour tier.
    pub tier: CrTier,
}

/// Formats an integer-percent collateralization ratio (`150` = 150 %).
///
/// Above 150 is healthy, 120 through 150 is a warning, anything lower is an
/// error.
pub fn format_cr(percent: u64) -> CrDisplay {
    let tier = if percent > 150 {
        CrTier::Success
    } else if percent >= 120 {
        CrTier::Warning
    } else {
        CrTier::Error
    };
    CrDisplay {
        text: format!("{}%", group_thousands(&percent.to_string())),
        tier,
    }
}

/// Truncates an address to `0x1234...5678`; short strings pass through.
pub fn format_address(address: &str, chars: usize) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return address.to_string();
    }
    let head = (chars + 2).min(address.len());
    let tail = address.len().saturating_sub(chars);
    format!("{}...{}", &address[..head], &address[tail..])
}

/// `"Xd Xh Xm"` countdown; `"Ready"` once elapsed.
pub fn format_time_remaining(seconds: i64) -> String {
    if seconds <= 0 {
        return "Ready".to_string();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::parse;

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(ScaledAmount::zero()), "$0.00");
        assert_eq!(format_usd(parse("1234", 18)), "$1,234.00");
        assert_eq!(format_usd(parse("1234.56", 18)), "$1,234.56");
        assert_eq!(format_usd(parse("1000000", 18)), "$1,000,000.00");
        assert_eq!(format_usd(parse("0.01", 18)), "$0.01");
    }

    #[test]
    fn compact_usd() {
        assert_eq!(format_usd_compact(parse("1234", 18)), "$1.23K");
        assert_eq!(format_usd_compact(parse("2500000", 18)), "$2.5M");
        assert_eq!(format_usd_compact(parse("999", 18)), "$999");
    }

    #[test]
    fn token_formatting() {
        assert_eq!(format_eth(ScaledAmount::zero()), "0 ETH");
        assert_eq!(format_eth(parse("10", 18)), "10 ETH");
        assert_eq!(format_token(parse("1.23456789", 18), "ETH", 2), "1.23 ETH");
        assert_eq!(format_usdx(parse("990.1234", 18)), "990.12 USDX");
        assert_eq!(format_token(parse("1000", 18), "USDX", 0), "1,000 USDX");
    }

    #[test]
    fn percent_formatting() {
        assert_eq!(format_percent(1234), "12.34%");
        assert_eq!(format_percent(0), "0%");
        assert_eq!(format_percent(50), "0.5%");
    }

    #[test]
    fn cr_tiers() {
        assert_eq!(format_cr(160).tier, CrTier::Success);
        assert_eq!(format_cr(130).tier, CrTier::Warning);
        assert_eq!(format_cr(110).tier, CrTier::Error);
        assert_eq!(format_cr(150).tier, CrTier::Warning);
        assert_eq!(format_cr(120).tier, CrTier::Warning);
        assert_eq!(format_cr(0).tier, CrTier::Error);
        assert_eq!(format_cr(99).text, "99%");
    }

    #[test]
    fn address_truncation() {
        let addr = "0x1234567890abcdef1234567890abcdef12345678";
        assert_eq!(format_address(addr, 4), "0x1234...5678");
        assert_eq!(format_address(addr, 6), "0x123456...345678");
        assert_eq!(format_address("0x1234", 4), "0x1234");
        assert_eq!(format_address("", 4), "");
    }

    #[test]
    fn time_remaining() {
        assert_eq!(format_time_remaining(0), "Ready");
        assert_eq!(format_time_remaining(-100), "Ready");
        assert_eq!(format_time_remaining(300), "5m");
        assert_eq!(format_time_remaining(3_700), "1h 1m");
        assert_eq!(format_time_remaining(90_061), "1d 1h 1m");
        assert_eq!(format_time_remaining(14 * 86_400), "14d");
    }
}
