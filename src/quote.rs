//! Live bonding-curve quotes for a user-entered amount.
//!
//! Every amount change and every refresh takes a new sequence number; a
//! response is applied only if no newer request started meanwhile, so the
//! view always reflects the latest input.

use crate::amount::ScaledAmount;
use crate::cache::{CacheHandle, CacheSlot};
use crate::errors::{classify, SettlementError};
use crate::settlement::{Clock, ContractId, ReadCall, ReadValue, ReturnShape, Settlement};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

const LOG_TARGET: &str = "usdx::quote";
/// Default refresh cadence while an amount is entered.
pub const QUOTE_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Which side of the curve is being quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    /// USDX wanted, ETH cost returned.
    Mint,
    /// USDX in, ETH out and fee returned.
    Redeem,
}

impl TradeDirection {
    /// The read that prices `amount`.
    pub fn read_call(self, amount: ScaledAmount) -> ReadCall {
        match self {
            TradeDirection::Mint => {
                ReadCall::new(ContractId::BondingCurve, "calculateMintCost", ReturnShape::Uint)
            }
            TradeDirection::Redeem => ReadCall::new(
                ContractId::BondingCurve,
                "calculateRedeemReturn",
                ReturnShape::Record(vec![("ethOut", ReturnShape::Uint), ("fee", ReturnShape::Uint)]),
            ),
        }
        .arg(amount)
    }

    /// Adapts the raw read into `(counter_amount, fee)`.
    pub fn decode(self, value: &ReadValue) -> Result<(ScaledAmount, ScaledAmount), SettlementError> {
        let mismatch =
            || SettlementError::Decode(format!("unexpected {:?} quote shape: {:?}", self, value));
        match self {
            TradeDirection::Mint => value
                .as_amount()
                .map(|cost| (cost, ScaledAmount::zero()))
                .ok_or_else(mismatch),
            TradeDirection::Redeem => {
                let eth_out = value.field(0, "ethOut").and_then(ReadValue::as_amount);
                let fee = value.field(1, "fee").and_then(ReadValue::as_amount);
                eth_out.zip(fee).ok_or_else(mismatch)
            }
        }
    }
}

/// A priced amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// ETH cost (mint) or ETH out (redeem).
    pub counter_amount: ScaledAmount,
    /// Protocol fee; zero for mint.
    pub fee: ScaledAmount,
    /// Unix seconds when the response arrived.
    pub fetched_at: u64,
}

/// Snapshot of the engine for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QuoteView {
    /// Amount being priced.
    pub amount: ScaledAmount,
    /// Latest applicable quote.
    pub quote: Option<Quote>,
    /// A request for the current amount is outstanding.
    pub is_loading: bool,
    /// Classified message of the last failed read.
    pub error: Option<String>,
}

#[derive(Default)]
struct QuoteState {
    amount: ScaledAmount,
    seq: u64,
    quote: Option<Quote>,
    loading: bool,
    error: Option<String>,
}

impl QuoteState {
    fn view(&self) -> QuoteView {
        QuoteView {
            amount: self.amount,
            quote: self.quote.clone(),
            is_loading: self.loading,
            error: self.error.clone(),
        }
    }
}

/// Keeps one direction's quote current for the entered amount.
pub struct QuoteEngine {
    direction: TradeDirection,
    settlement: Arc<dyn Settlement>,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    cache: Arc<CacheSlot>,
    state: Mutex<QuoteState>,
    amount_changed: Notify,
}

impl QuoteEngine {
    /// Engine with the default refresh cadence.
    pub fn new(direction: TradeDirection, settlement: Arc<dyn Settlement>, clock: Arc<dyn Clock>) -> Self {
        let name = match direction {
            TradeDirection::Mint => "mint-quote",
            TradeDirection::Redeem => "redeem-quote",
        };
        Self {
            direction,
            settlement,
            clock,
            refresh_interval: QUOTE_REFRESH_INTERVAL,
            cache: Arc::new(CacheSlot::new(name)),
            state: Mutex::new(QuoteState::default()),
            amount_changed: Notify::new(),
        }
    }

    /// Overrides the refresh cadence.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Direction being quoted.
    pub fn direction(&self) -> TradeDirection {
        self.direction
    }

    /// Handle a confirmed transaction uses to force a refetch.
    pub fn cache_handle(&self) -> Arc<dyn CacheHandle> {
        self.cache.clone()
    }

    fn lock(&self) -> MutexGuard<'_, QuoteState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current snapshot.
    pub fn view(&self) -> QuoteView {
        self.lock().view()
    }

    /// Replaces the amount being priced; any outstanding response becomes
    /// stale.
    pub fn set_amount(&self, amount: ScaledAmount) {
        {
            let mut state = self.lock();
            if state.amount == amount {
                return;
            }
            state.amount = amount;
            state.seq += 1;
            state.quote = None;
            state.error = None;
            state.loading = !amount.is_zero();
        }
        self.amount_changed.notify_one();
    }

    /// Fetches a quote for the current amount and applies it unless a newer
    /// request superseded it.
    pub async fn refresh(&self) -> QuoteView {
        let (seq, amount) = {
            let mut state = self.lock();
            if state.amount.is_zero() {
                state.quote = None;
                state.loading = false;
                state.error = None;
                return state.view();
            }
            state.seq += 1;
            state.loading = true;
            (state.seq, state.amount)
        };

        let result = self
            .settlement
            .read(&self.direction.read_call(amount))
            .await
            .and_then(|value| self.direction.decode(&value));

        let mut state = self.lock();
        if state.seq != seq {
            debug!(target: LOG_TARGET, direction = ?self.direction, seq, latest = state.seq, evt = "STALE_DISCARD");
            return state.view();
        }
        state.loading = false;
        match result {
            Ok((counter_amount, fee)) => {
                state.quote = Some(Quote {
                    counter_amount,
                    fee,
                    fetched_at: self.clock.now(),
                });
                state.error = None;
            }
            Err(err) => {
                let message = classify(&err).message;
                warn!(target: LOG_TARGET, direction = ?self.direction, %amount, error = %message, evt = "QUOTE_FAILED");
                state.quote = None;
                state.error = Some(message);
            }
        }
        state.view()
    }

    /// Refreshes on the interval, on amount changes, and on invalidation.
    /// Runs until the task is dropped or aborted.
    pub async fn run(self: Arc<Self>) {
        let mut invalidations = self.cache.subscribe();
        let mut ticker = time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.amount_changed.notified() => ticker.reset(),
                changed = invalidations.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            self.refresh().await;
        }
    }
}
