//! Protocol health warnings derived from a stats snapshot.

use serde::Serialize;
use std::collections::BTreeSet;

/// Below this CR (percent) redemptions are disabled.
pub const CRITICAL_CR_PCT: u64 = 70;
/// Below this CR (percent) liquidation fees apply.
pub const LOW_CR_PCT: u64 = 120;
/// Oracle prices older than this are flagged.
pub const ORACLE_STALE_SECS: u64 = 3_600;
/// Length of the post-deployment warmup.
pub const WARMUP_DAYS: u64 = 30;
const SECS_PER_DAY: u64 = 86_400;

/// Keys that stay visible no matter what the user dismisses.
pub const NON_DISMISSABLE: [&str; 2] = ["paused", "critical-cr"];

/// Severity of a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Informational.
    Info,
    /// Degraded.
    Warning,
    /// Trading impaired.
    Error,
}

/// A displayable warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Stable identifier.
    pub key: &'static str,
    /// Severity.
    pub level: WarningLevel,
    /// Display text.
    pub message: String,
    /// Whether the user may hide it.
    pub dismissable: bool,
}

/// Protocol fields the warnings depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProtocolSnapshot {
    /// Trading halted by the admin.
    pub paused: bool,
    /// Contract superseded by a newer deployment.
    pub deprecated: bool,
    /// Collateralization ratio as an integer percent; zero means unknown.
    pub cr_percent: u64,
    /// Unix seconds of the last oracle update; zero means unknown.
    pub last_price_update_at: u64,
    /// Unix seconds of deployment; zero means unknown.
    pub deployment_at: u64,
}

/// Warnings the user dismissed during this session.
#[derive(Debug, Clone, Default)]
pub struct WarningSession {
    dismissed: BTreeSet<String>,
}

impl WarningSession {
    /// Empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hides a warning.  Returns false for keys that cannot be dismissed.
    pub fn dismiss(&mut self, key: &str) -> bool {
        if NON_DISMISSABLE.contains(&key) {
            return false;
        }
        self.dismissed.insert(key.to_string());
        true
    }

    /// Shows every warning again.
    pub fn reset_warnings(&mut self) {
        self.dismissed.clear();
    }

    /// Whether `key` is currently hidden.
    pub fn is_dismissed(&self, key: &str) -> bool {
        self.dismissed.contains(key)
    }
}

/// Renders an integer percent with one decimal, e.g. `65.0`.
fn pct(value: u64) -> String {
    format!("{value}.0")
}

/// Hours to one decimal, rounding half up.
fn hours(seconds: u64) -> String {
    let tenths = (seconds.saturating_mul(10).saturating_add(1_800)) / 3_600;
    format!("{}.{}", tenths / 10, tenths % 10)
}

/// Evaluates every rule in order and drops dismissed warnings.
pub fn derive_warnings(snapshot: &ProtocolSnapshot, now: u64, session: &WarningSession) -> Vec<Warning> {
    let mut out = Vec::new();
    let mut push = |key: &'static str, level, message: String, dismissable| {
        out.push(Warning {
            key,
            level,
            message,
            dismissable,
        })
    };

    if snapshot.paused {
        push(
            "paused",
            WarningLevel::Error,
            "Protocol is paused. Trading is disabled.".to_string(),
            false,
        );
    }
    if snapshot.deprecated {
        push(
            "deprecated",
            WarningLevel::Info,
            "This contract version is deprecated. Please migrate to the new version.".to_string(),
            true,
        );
    }

    let cr = snapshot.cr_percent;
    if cr > 0 && cr < CRITICAL_CR_PCT {
        push(
            "critical-cr",
            WarningLevel::Error,
            format!("CR critically low ({}%). Redemptions disabled.", pct(cr)),
            false,
        );
    } else if cr > 0 && cr < LOW_CR_PCT {
        push(
            "low-cr",
            WarningLevel::Warning,
            format!("Liquidation fees active. CR below 120% ({}%).", pct(cr)),
            true,
        );
    }

    if snapshot.last_price_update_at > 0 {
        let age = now.saturating_sub(snapshot.last_price_update_at);
        if age > ORACLE_STALE_SECS {
            push(
                "oracle-stale",
                WarningLevel::Warning,
                format!("Oracle price is {} hours old. Prices may be inaccurate.", hours(age)),
                true,
            );
        }
    }

    if snapshot.deployment_at > 0 {
        let elapsed = now.saturating_sub(snapshot.deployment_at);
        if elapsed < WARMUP_DAYS * SECS_PER_DAY {
            let day = elapsed.div_ceil(SECS_PER_DAY);
            push(
                "warmup",
                WarningLevel::Info,
                format!("Warmup period (Day {day}/{WARMUP_DAYS}). Volume caps are reduced."),
                true,
            );
        }
    }

    out.retain(|w| !session.is_dismissed(w.key));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn keys(warnings: &[Warning]) -> Vec<&'static str> {
        warnings.iter().map(|w| w.key).collect()
    }

    #[test]
    fn paused_comes_first_and_cr_bands_are_exclusive() {
        let snapshot = ProtocolSnapshot {
            paused: true,
            cr_percent: 50,
            ..Default::default()
        };
        let warnings = derive_warnings(&snapshot, NOW, &WarningSession::new());
        assert_eq!(keys(&warnings), vec!["paused", "critical-cr"]);
        assert_eq!(warnings[1].message, "CR critically low (50.0%). Redemptions disabled.");
        assert!(!warnings[0].dismissable);
    }

    #[test]
    fn low_cr_band() {
        let snapshot = ProtocolSnapshot {
            cr_percent: 110,
            ..Default::default()
        };
        let warnings = derive_warnings(&snapshot, NOW, &WarningSession::new());
        assert_eq!(keys(&warnings), vec!["low-cr"]);
        assert_eq!(warnings[0].message, "Liquidation fees active. CR below 120% (110.0%).");

        let healthy = ProtocolSnapshot {
            cr_percent: 120,
            ..Default::default()
        };
        assert!(derive_warnings(&healthy, NOW, &WarningSession::new()).is_empty());
    }

    #[test]
    fn unknown_values_raise_nothing() {
        assert!(derive_warnings(&ProtocolSnapshot::default(), NOW, &WarningSession::new()).is_empty());
    }

    #[test]
    fn oracle_staleness_in_hours() {
        let snapshot = ProtocolSnapshot {
            last_price_update_at: NOW - 5_400,
            ..Default::default()
        };
        let warnings = derive_warnings(&snapshot, NOW, &WarningSession::new());
        assert_eq!(
            warnings[0].message,
            "Oracle price is 1.5 hours old. Prices may be inaccurate."
        );
        let fresh = ProtocolSnapshot {
            last_price_update_at: NOW - 3_600,
            ..Default::default()
        };
        assert!(derive_warnings(&fresh, NOW, &WarningSession::new()).is_empty());
    }

    #[test]
    fn warmup_day_rounds_up() {
        let snapshot = ProtocolSnapshot {
            deployment_at: NOW - 86_400 - 1,
            ..Default::default()
        };
        let warnings = derive_warnings(&snapshot, NOW, &WarningSession::new());
        assert_eq!(
            warnings[0].message,
            "Warmup period (Day 2/30). Volume caps are reduced."
        );
        let done = ProtocolSnapshot {
            deployment_at: NOW - 30 * 86_400,
            ..Default::default()
        };
        assert!(derive_warnings(&done, NOW, &WarningSession::new()).is_empty());
    }

    #[test]
    fn dismissal_rules() {
        let snapshot = ProtocolSnapshot {
            paused: true,
            deprecated: true,
            cr_percent: 60,
            ..Default::default()
        };
        let mut session = WarningSession::new();
        assert!(!session.dismiss("paused"));
        assert!(!session.dismiss("critical-cr"));
        assert!(session.dismiss("deprecated"));
        assert_eq!(
            keys(&derive_warnings(&snapshot, NOW, &session)),
            vec!["paused", "critical-cr"]
        );
        session.reset_warnings();
        assert_eq!(
            keys(&derive_warnings(&snapshot, NOW, &session)),
            vec!["paused", "deprecated", "critical-cr"]
        );
    }
}
