//! Pending unstake requests and their cooldown.

use crate::amount::ScaledAmount;
use crate::errors::SettlementError;
use crate::settlement::{Address, ContractId, ReadCall, ReadValue, ReturnShape, Settlement};
use serde::Serialize;
use tracing::warn;

const LOG_TARGET: &str = "usdx::unstake";

/// One live unstake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnstakeEntry {
    /// Position in the on-chain list; pass to `completeUnstake`.
    pub index: usize,
    /// USDX being unstaked.
    pub amount: ScaledAmount,
    /// Unix seconds when the cooldown ends.
    pub completion_time: u64,
    /// Seconds left, zero once ready.
    pub seconds_remaining: u64,
    /// Cooldown elapsed.
    pub is_ready: bool,
}

/// The account's unstake queue in on-chain order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UnstakeQueue {
    /// Live entries; completed (zero-amount) slots are omitted.
    pub entries: Vec<UnstakeEntry>,
}

impl UnstakeQueue {
    /// Number of live entries.
    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether any entry can be completed now.
    pub fn has_ready(&self) -> bool {
        self.entries.iter().any(|e| e.is_ready)
    }

    /// Recomputes countdowns against a later clock reading.
    pub fn at(&self, now: u64) -> UnstakeQueue {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let seconds_remaining = entry.completion_time.saturating_sub(now);
                UnstakeEntry {
                    seconds_remaining,
                    is_ready: seconds_remaining == 0,
                    ..entry.clone()
                }
            })
            .collect();
        UnstakeQueue { entries }
    }
}

/// Record shape of one on-chain request.
pub fn request_shape() -> ReturnShape {
    ReturnShape::Record(vec![
        ("amount", ReturnShape::Uint),
        ("completionTime", ReturnShape::Uint),
    ])
}

/// Builds the queue from raw entries, keeping original indices.
pub fn build_queue(raw: &[ReadValue], now: u64) -> UnstakeQueue {
    let mut entries = Vec::new();
    for (index, item) in raw.iter().enumerate() {
        let amount = item.field(0, "amount").and_then(ReadValue::as_amount);
        let completion = item.field(1, "completionTime").and_then(ReadValue::as_uint);
        let (Some(amount), Some(completion)) = (amount, completion) else {
            warn!(target: LOG_TARGET, index, evt = "MALFORMED_ENTRY");
            continue;
        };
        if amount.is_zero() {
            continue;
        }
        let completion_time = completion.saturating_u64();
        let seconds_remaining = completion_time.saturating_sub(now);
        entries.push(UnstakeEntry {
            index,
            amount,
            completion_time,
            seconds_remaining,
            is_ready: seconds_remaining == 0,
        });
    }
    UnstakeQueue { entries }
}

/// Reads `getUnstakeRequests(account)` and builds the queue.
pub async fn fetch_queue(
    settlement: &dyn Settlement,
    account: Address,
    now: u64,
) -> Result<UnstakeQueue, SettlementError> {
    let call = ReadCall::new(
        ContractId::StakingRewards,
        "getUnstakeRequests",
        ReturnShape::List(Box::new(request_shape())),
    )
    .arg(account);
    let value = settlement.read(&call).await?;
    let items = value
        .as_list()
        .ok_or_else(|| SettlementError::Decode(format!("expected a list of unstake requests, got {value:?}")))?;
    Ok(build_queue(items, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tokens, uint, FakeSettlement};

    const NOW: u64 = 1_000_000;

    fn record(amount: ReadValue, completion: u64) -> ReadValue {
        ReadValue::Record(vec![
            ("amount".into(), amount),
            ("completionTime".into(), uint(completion)),
        ])
    }

    #[test]
    fn zero_amounts_skip_without_shifting_indices() {
        let raw = vec![
            record(tokens(5), NOW - 10),
            record(uint(0), NOW + 100),
            ReadValue::Tuple(vec![tokens(7), uint(NOW + 300)]),
        ];
        let queue = build_queue(&raw, NOW);
        assert_eq!(queue.active_count(), 2);
        assert_eq!(queue.entries[0].index, 0);
        assert!(queue.entries[0].is_ready);
        assert_eq!(queue.entries[1].index, 2);
        assert_eq!(queue.entries[1].seconds_remaining, 300);
        assert!(!queue.entries[1].is_ready);
        assert!(queue.has_ready());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let raw = vec![ReadValue::Bool(true), record(tokens(1), NOW + 5)];
        let queue = build_queue(&raw, NOW);
        assert_eq!(queue.active_count(), 1);
        assert_eq!(queue.entries[0].index, 1);
        assert!(!queue.has_ready());
    }

    #[test]
    fn countdown_advances() {
        let raw = vec![record(tokens(2), NOW + 60)];
        let queue = build_queue(&raw, NOW);
        assert!(!queue.has_ready());
        let later = queue.at(NOW + 60);
        assert!(later.has_ready());
        assert_eq!(later.entries[0].index, 0);
    }

    #[test]
    fn empty_queue() {
        let queue = build_queue(&[], NOW);
        assert_eq!(queue.active_count(), 0);
        assert!(!queue.has_ready());
    }

    #[tokio::test]
    async fn fetch_reads_staking_contract() {
        let settlement = FakeSettlement::with_reads(|call| {
            assert_eq!(call.contract, ContractId::StakingRewards);
            assert_eq!(call.signature(), "getUnstakeRequests(address)");
            Ok(ReadValue::List(vec![record(tokens(3), 0)]))
        });
        let queue = fetch_queue(&settlement, Address::ZERO, NOW).await.unwrap();
        assert_eq!(queue.entries[0].amount, ScaledAmount::from_units(3, 18));
        assert!(queue.entries[0].is_ready);
    }

    #[tokio::test]
    async fn non_list_is_a_decode_error() {
        let settlement = FakeSettlement::with_reads(|_| Ok(uint(1)));
        let err = fetch_queue(&settlement, Address::ZERO, NOW).await.unwrap_err();
        assert!(matches!(err, SettlementError::Decode(_)));
    }
}
