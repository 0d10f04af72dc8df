//! One account's view of the protocol: cached reads, quote engines, the
//! dismissed-warning store, and one lifecycle per action pre-wired with the
//! caches that action invalidates.

use crate::account::{self, Allowance, Balances, StakingPosition};
use crate::actions;
use crate::cache::{CacheHandle, CachedRead};
use crate::config::ClientConfig;
use crate::errors::SettlementError;
use crate::lifecycle::TxLifecycle;
use crate::notify::NotificationSink;
use crate::quote::{QuoteEngine, TradeDirection};
use crate::settlement::{Address, Clock, ContractId, Settlement};
use crate::stats::{self, ProtocolStats};
use crate::unstake::{self, UnstakeQueue};
use crate::warnings::{derive_warnings, Warning, WarningSession};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors from account-scoped session reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No account configured for an account-scoped read.
    #[error("no account configured; set USDX_ACCOUNT")]
    NoAccount,
    /// Underlying read failed.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

/// Shared state for one connected account.
pub struct ClientSession {
    config: ClientConfig,
    settlement: Arc<dyn Settlement>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    stats: Arc<CachedRead<ProtocolStats>>,
    balances: Arc<CachedRead<Balances>>,
    position: Arc<CachedRead<StakingPosition>>,
    queue: Arc<CachedRead<UnstakeQueue>>,
    mint_quote: Arc<QuoteEngine>,
    redeem_quote: Arc<QuoteEngine>,
    warnings: Mutex<WarningSession>,
    lifecycles: Mutex<HashMap<String, Arc<TxLifecycle>>>,
}

impl ClientSession {
    /// Builds a session; nothing is fetched until asked.
    pub fn new(
        config: ClientConfig,
        settlement: Arc<dyn Settlement>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let refresh = config.refresh;
        let quote = |direction| {
            Arc::new(
                QuoteEngine::new(direction, settlement.clone(), clock.clone())
                    .with_refresh_interval(refresh.quote),
            )
        };
        let mint_quote = quote(TradeDirection::Mint);
        let redeem_quote = quote(TradeDirection::Redeem);
        Self {
            mint_quote,
            redeem_quote,
            stats: Arc::new(CachedRead::new("protocol-stats", refresh.medium)),
            balances: Arc::new(CachedRead::new("balances", refresh.fast)),
            position: Arc::new(CachedRead::new("staking-position", refresh.medium)),
            queue: Arc::new(CachedRead::new("unstake-queue", refresh.slow)),
            warnings: Mutex::new(WarningSession::new()),
            lifecycles: Mutex::new(HashMap::new()),
            config,
            settlement,
            clock,
            notifier,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Quote engine for one direction.
    pub fn quote_engine(&self, direction: TradeDirection) -> Arc<QuoteEngine> {
        match direction {
            TradeDirection::Mint => self.mint_quote.clone(),
            TradeDirection::Redeem => self.redeem_quote.clone(),
        }
    }

    fn account(&self) -> Result<Address, SessionError> {
        self.config.account.ok_or(SessionError::NoAccount)
    }

    /// Protocol statistics, cached for the medium interval.
    pub async fn stats(&self) -> ProtocolStats {
        let fetched = self
            .stats
            .get_or_fetch(|| async { Ok::<_, Infallible>(stats::fetch_stats(self.settlement.as_ref()).await) })
            .await;
        match fetched {
            Ok(stats) => stats,
            Err(never) => match never {},
        }
    }

    /// Active warnings after session dismissals.
    pub async fn warnings(&self) -> Vec<Warning> {
        let snapshot = self.stats().await.snapshot();
        let now = self.clock.now();
        derive_warnings(&snapshot, now, &self.warning_store())
    }

    fn warning_store(&self) -> MutexGuard<'_, WarningSession> {
        self.warnings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hides a dismissable warning for the rest of the session.
    pub fn dismiss_warning(&self, key: &str) -> bool {
        self.warning_store().dismiss(key)
    }

    /// Shows every dismissed warning again.
    pub fn reset_warnings(&self) {
        self.warning_store().reset_warnings();
    }

    /// ETH and USDX balances of the configured account.
    pub async fn balances(&self) -> Result<Balances, SessionError> {
        let account = self.account()?;
        Ok(self
            .balances
            .get_or_fetch(|| account::fetch_balances(self.settlement.as_ref(), account))
            .await?)
    }

    /// Staking position of the configured account.
    pub async fn position(&self) -> Result<StakingPosition, SessionError> {
        let account = self.account()?;
        Ok(self
            .position
            .get_or_fetch(|| account::fetch_position(self.settlement.as_ref(), account))
            .await?)
    }

    /// Unstake queue of the configured account, countdowns as of now.
    pub async fn unstake_queue(&self) -> Result<UnstakeQueue, SessionError> {
        let account = self.account()?;
        let now = self.clock.now();
        let queue = self
            .queue
            .get_or_fetch(|| unstake::fetch_queue(self.settlement.as_ref(), account, now))
            .await?;
        Ok(queue.at(now))
    }

    /// USDX allowance the configured account granted to `spender`.
    pub async fn allowance(&self, spender: ContractId) -> Result<Allowance, SessionError> {
        let owner = self.account()?;
        let spender = self.config.contracts.address_of(spender);
        Ok(account::fetch_allowance(self.settlement.as_ref(), owner, spender).await?)
    }

    /// Caches an action's confirmation makes stale.
    pub fn caches_for(&self, action_label: &str) -> Vec<Arc<dyn CacheHandle>> {
        let balances: Arc<dyn CacheHandle> = self.balances.clone();
        let stats: Arc<dyn CacheHandle> = self.stats.clone();
        let position: Arc<dyn CacheHandle> = self.position.clone();
        let queue: Arc<dyn CacheHandle> = self.queue.clone();
        let mint = self.mint_quote.cache_handle();
        let redeem = self.redeem_quote.cache_handle();
        match action_label {
            actions::MINT_USDX | actions::REDEEM_ETH => vec![balances, stats, mint, redeem],
            actions::APPROVE_USDX => vec![balances],
            actions::STAKE_USDX | actions::CLAIM_REWARDS => vec![balances, position, stats],
            actions::INITIATE_UNSTAKE | actions::COMPLETE_UNSTAKE => {
                vec![balances, position, queue, stats]
            }
            actions::UPDATE_PRICE => vec![stats, mint, redeem],
            _ => vec![balances, stats, position, queue, mint, redeem],
        }
    }

    /// The lifecycle owning `action_label`'s submissions, wired to this
    /// session's caches, chain and confirmation bound.  Every call for the
    /// same label returns the same instance, so one action never has two
    /// submissions in flight.
    pub fn lifecycle(&self, action_label: &str) -> Arc<TxLifecycle> {
        let mut lifecycles = self.lifecycles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = lifecycles.get(action_label) {
            return existing.clone();
        }
        let lifecycle = Arc::new(
            TxLifecycle::new(action_label, self.settlement.clone(), self.notifier.clone())
                .with_caches(self.caches_for(action_label))
                .with_chain_id(self.config.chain_id)
                .with_confirmation_timeout(self.config.confirmation_timeout),
        );
        lifecycles.insert(action_label.to_string(), lifecycle.clone());
        lifecycle
    }
}
