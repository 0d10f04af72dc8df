//! Protocol-wide statistics read in one batch.

use crate::amount::ScaledAmount;
use crate::errors::SettlementError;
use crate::settlement::{ContractId, ReadCall, ReadValue, ReturnShape, Settlement};
use crate::u256::U256;
use crate::warnings::ProtocolSnapshot;
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

const LOG_TARGET: &str = "usdx::stats";

/// Everything the dashboard and warnings need about the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProtocolStats {
    /// Collateralization ratio, integer percent.
    pub cr_percent: u64,
    /// ETH held in reserve.
    pub eth_reserves: ScaledAmount,
    /// USDX in circulation.
    pub total_supply: ScaledAmount,
    /// Oracle ETH price in USD, 18 decimals.
    pub eth_price: ScaledAmount,
    /// Volume traded since the last oracle update.
    pub volume_since_update: ScaledAmount,
    /// Current per-update volume cap.
    pub volume_cap: ScaledAmount,
    /// Trading halted.
    pub paused: bool,
    /// Contract superseded.
    pub deprecated: bool,
    /// Unix seconds of the last oracle update.
    pub last_price_update_at: u64,
    /// Warmup multiplier applied to the volume cap, basis points.
    pub warmup_multiplier_bps: u64,
    /// Unix seconds of deployment.
    pub deployment_at: u64,
    /// USDX staked.
    pub total_staked: ScaledAmount,
    /// Number of reads that failed and fell back to zero.
    pub failed_reads: usize,
}

impl ProtocolStats {
    /// Fields the warning rules look at.
    pub fn snapshot(&self) -> ProtocolSnapshot {
        ProtocolSnapshot {
            paused: self.paused,
            deprecated: self.deprecated,
            cr_percent: self.cr_percent,
            last_price_update_at: self.last_price_update_at,
            deployment_at: self.deployment_at,
        }
    }

    /// Share of the volume cap already used, in basis points.
    pub fn volume_used_bps(&self) -> u64 {
        if self.volume_cap.is_zero() {
            return 0;
        }
        let used = self.volume_since_update.raw().saturating_mul(U256::from(10_000u64)) / self.volume_cap.raw();
        used.saturating_u64()
    }
}

fn reads() -> Vec<ReadCall> {
    use ContractId::*;
    use ReturnShape::{Bool, Uint};
    vec![
        ReadCall::new(BondingCurve, "getCurrentCR", Uint),
        ReadCall::new(BondingCurve, "ethReserves", Uint),
        ReadCall::new(StableCoin, "totalSupply", Uint),
        ReadCall::new(BondingCurve, "currentPrice", Uint),
        ReadCall::new(BondingCurve, "volumeSinceUpdate", Uint),
        ReadCall::new(BondingCurve, "getCurrentVolumeCap", Uint),
        ReadCall::new(BondingCurve, "paused", Bool),
        ReadCall::new(BondingCurve, "deprecated", Bool),
        ReadCall::new(BondingCurve, "lastPriceUpdate", Uint),
        ReadCall::new(BondingCurve, "getWarmupMultiplier", Uint),
        ReadCall::new(BondingCurve, "deploymentTime", Uint),
        ReadCall::new(StakingRewards, "totalStaked", Uint),
    ]
}

/// Reads every statistic concurrently.  A failed read is logged and left at
/// its zero value so one bad field does not blank the dashboard.
pub async fn fetch_stats(settlement: &dyn Settlement) -> ProtocolStats {
    let calls = reads();
    let results = join_all(calls.iter().map(|call| settlement.read(call))).await;

    let mut failed_reads = 0;
    let mut values: Vec<Option<ReadValue>> = Vec::with_capacity(results.len());
    for (call, result) in calls.iter().zip(results) {
        match result {
            Ok(value) => values.push(Some(value)),
            Err(err) => {
                failed_reads += 1;
                log_failure(call, &err);
                values.push(None);
            }
        }
    }

    let uint = |i: usize| values[i].as_ref().and_then(ReadValue::as_uint).unwrap_or_default();
    let amount = |i: usize| ScaledAmount::from_raw(uint(i));
    let flag = |i: usize| values[i].as_ref().and_then(ReadValue::as_bool).unwrap_or(false);

    ProtocolStats {
        cr_percent: uint(0).saturating_u64(),
        eth_reserves: amount(1),
        total_supply: amount(2),
        eth_price: amount(3),
        volume_since_update: amount(4),
        volume_cap: amount(5),
        paused: flag(6),
        deprecated: flag(7),
        last_price_update_at: uint(8).saturating_u64(),
        warmup_multiplier_bps: uint(9).saturating_u64(),
        deployment_at: uint(10).saturating_u64(),
        total_staked: amount(11),
        failed_reads,
    }
}

fn log_failure(call: &ReadCall, err: &SettlementError) {
    warn!(target: LOG_TARGET, function = call.function, error = %err, evt = "READ_FAILED");
}
