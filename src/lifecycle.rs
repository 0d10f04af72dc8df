//! Tracked submission of one user action from signer prompt to confirmation.
//!
//! A [`TxLifecycle`] owns at most one active submission.  State lives behind
//! a short `std::sync::Mutex` that is never held across an await; an epoch
//! counter tells a resumed task whether the submission it started is still
//! the one being tracked or was discarded by [`TxLifecycle::reset`].

use crate::cache::CacheHandle;
use crate::errors::{classify, ClassifiedError, SettlementError};
use crate::notify::{explorer_tx_url, Notification, NotificationSink, NotifyLevel};
use crate::settlement::{Receipt, Settlement, SubmitRequest, TxHandle};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "usdx::tx";
/// Default bound on a confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Callback run once after a confirmed submission.
pub type SuccessCallback = Arc<dyn Fn(&TxHandle) + Send + Sync>;

/// Where a submission is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Nothing in flight.
    Idle,
    /// Waiting on the signer.
    Prompting,
    /// Broadcast, waiting for inclusion.
    Pending,
    /// Confirmed.
    Success,
    /// Rejected, reverted, or timed out.
    Error,
}

impl TxStatus {
    /// Prompting or Pending.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TxStatus::Prompting | TxStatus::Pending)
    }
}

/// Observable state of the tracked submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Human label, e.g. `Mint USDX`.
    pub action_label: String,
    /// Current status.
    pub status: TxStatus,
    /// Settlement reference once broadcast.
    pub handle: Option<TxHandle>,
    /// Classified failure message in the Error state.
    pub error_message: Option<String>,
}

impl Submission {
    fn idle(action_label: &str) -> Self {
        Self {
            action_label: action_label.to_string(),
            status: TxStatus::Idle,
            handle: None,
            error_message: None,
        }
    }
}

/// Result of [`TxLifecycle::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Another submission was in flight; nothing happened.
    Ignored,
    /// Included on chain.
    Confirmed(TxHandle),
    /// Rejected, reverted, or timed out.
    Failed(ClassifiedError),
    /// `reset()` discarded tracking while this submission was in flight.
    Detached,
}

struct Tracking {
    submission: Submission,
    epoch: u64,
}

/// Drives one action's submissions and their side effects.
pub struct TxLifecycle {
    settlement: Arc<dyn Settlement>,
    notifier: Arc<dyn NotificationSink>,
    caches: Vec<Arc<dyn CacheHandle>>,
    chain_id: Option<u64>,
    confirmation_timeout: Duration,
    on_success: Option<SuccessCallback>,
    tracking: Mutex<Tracking>,
    last_settled: Mutex<Option<TxHandle>>,
}

impl TxLifecycle {
    /// Lifecycle for `action_label` with no caches, no explorer links and the
    /// default confirmation bound.
    pub fn new(
        action_label: impl Into<String>,
        settlement: Arc<dyn Settlement>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let label = action_label.into();
        Self {
            settlement,
            notifier,
            caches: Vec::new(),
            chain_id: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            on_success: None,
            tracking: Mutex::new(Tracking {
                submission: Submission::idle(&label),
                epoch: 0,
            }),
            last_settled: Mutex::new(None),
        }
    }

    /// Adds a cache to invalidate after confirmation.
    pub fn with_cache(mut self, cache: Arc<dyn CacheHandle>) -> Self {
        self.caches.push(cache);
        self
    }

    /// Adds several caches.
    pub fn with_caches(mut self, caches: impl IntoIterator<Item = Arc<dyn CacheHandle>>) -> Self {
        self.caches.extend(caches);
        self
    }

    /// Enables explorer links for this chain.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Overrides the confirmation bound.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Runs `callback` after each confirmed submission.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TxHandle) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the tracked submission.
    pub fn submission(&self) -> Submission {
        self.lock().submission.clone()
    }

    /// Current status.
    pub fn status(&self) -> TxStatus {
        self.lock().submission.status
    }

    /// Handle of the tracked submission, once broadcast.
    pub fn handle(&self) -> Option<TxHandle> {
        self.lock().submission.handle.clone()
    }

    /// Drops tracking and returns to Idle.  An in-flight submission keeps
    /// running detached; only its cache invalidation survives.
    pub fn reset(&self) {
        let mut tracking = self.lock();
        tracking.epoch += 1;
        let label = tracking.submission.action_label.clone();
        tracking.submission = Submission::idle(&label);
    }

    fn begin(&self) -> Option<u64> {
        let mut tracking = self.lock();
        if tracking.submission.status.is_in_flight() {
            return None;
        }
        tracking.epoch += 1;
        tracking.submission.status = TxStatus::Prompting;
        tracking.submission.handle = None;
        tracking.submission.error_message = None;
        Some(tracking.epoch)
    }

    /// Applies `update` if `epoch` is still the tracked submission.
    fn update(&self, epoch: u64, update: impl FnOnce(&mut Submission)) -> bool {
        let mut tracking = self.lock();
        if tracking.epoch != epoch {
            return false;
        }
        update(&mut tracking.submission);
        true
    }

    fn action_label(&self) -> String {
        self.lock().submission.action_label.clone()
    }

    /// Signs, broadcasts and waits for `request`.  Ignored while another
    /// submission is Prompting or Pending.
    pub async fn execute(&self, request: SubmitRequest) -> ExecuteOutcome {
        let Some(epoch) = self.begin() else {
            debug!(target: LOG_TARGET, function = request.function, evt = "EXECUTE_IGNORED");
            return ExecuteOutcome::Ignored;
        };
        let label = self.action_label();
        info!(target: LOG_TARGET, action = %label, call = %request.signature(), evt = "PROMPT");

        let handle = match self.settlement.submit(&request).await {
            Ok(handle) => handle,
            Err(err) => return self.fail(epoch, &label, &err),
        };

        let tracked = self.update(epoch, |s| {
            s.status = TxStatus::Pending;
            s.handle = Some(handle.clone());
        });
        if !tracked {
            info!(target: LOG_TARGET, action = %label, handle = %handle, evt = "DETACHED");
            self.follow_detached(handle).await;
            return ExecuteOutcome::Detached;
        }

        info!(target: LOG_TARGET, action = %label, handle = %handle, evt = "SUBMITTED");
        let link = self.chain_id.and_then(|chain| explorer_tx_url(chain, &handle));
        self.notifier.notify(
            Notification::new(NotifyLevel::Info, "Transaction submitted")
                .with_description(format!("{label} is being confirmed..."))
                .with_link("View", link),
        );

        match self.wait(&handle).await {
            Ok(receipt) => self.succeed(epoch, &label, handle, receipt),
            Err(err) => self.fail(epoch, &label, &err),
        }
    }

    async fn wait(&self, handle: &TxHandle) -> Result<Receipt, SettlementError> {
        match tokio::time::timeout(self.confirmation_timeout, self.settlement.await_confirmation(handle)).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::Timeout(self.confirmation_timeout)),
        }
    }

    async fn follow_detached(&self, handle: TxHandle) {
        match self.wait(&handle).await {
            Ok(_) => {
                self.invalidate_once(&handle);
            }
            Err(err) => {
                debug!(target: LOG_TARGET, handle = %handle, error = %err, evt = "DETACHED_FAILED");
            }
        }
    }

    fn succeed(&self, epoch: u64, label: &str, handle: TxHandle, receipt: Receipt) -> ExecuteOutcome {
        let tracked = self.update(epoch, |s| s.status = TxStatus::Success);
        if !tracked {
            info!(target: LOG_TARGET, action = %label, handle = %handle, evt = "DETACHED_CONFIRMED");
            self.invalidate_once(&handle);
            return ExecuteOutcome::Detached;
        }
        info!(target: LOG_TARGET, action = %label, handle = %handle, block = ?receipt.block_number, evt = "CONFIRMED");
        if self.mark_settled(&handle) {
            self.notifier
                .notify(Notification::new(NotifyLevel::Success, format!("{label} confirmed!")));
            self.notifier.pulse();
            self.invalidate_caches();
            if let Some(callback) = &self.on_success {
                callback(&handle);
            }
        } else {
            warn!(target: LOG_TARGET, handle = %handle, evt = "DUPLICATE_CONFIRMATION");
        }
        ExecuteOutcome::Confirmed(handle)
    }

    fn fail(&self, epoch: u64, label: &str, err: &SettlementError) -> ExecuteOutcome {
        let classified = classify(err);
        let tracked = self.update(epoch, |s| {
            s.status = TxStatus::Error;
            s.error_message = Some(classified.message.clone());
        });
        if !tracked {
            debug!(target: LOG_TARGET, action = %label, error = %err, evt = "DETACHED_FAILED");
            return ExecuteOutcome::Detached;
        }
        if classified.is_user_rejection() {
            info!(target: LOG_TARGET, action = %label, evt = "REJECTED");
        } else {
            warn!(target: LOG_TARGET, action = %label, error = %err, message = %classified.message, evt = "FAILED");
            self.notifier.notify(
                Notification::new(NotifyLevel::Error, format!("{label} failed"))
                    .with_description(classified.message.clone()),
            );
        }
        ExecuteOutcome::Failed(classified)
    }

    /// Records `handle` as the latest settled submission; false if it
    /// already was.
    fn mark_settled(&self, handle: &TxHandle) -> bool {
        let mut last = self.last_settled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.as_ref() == Some(handle) {
            return false;
        }
        *last = Some(handle.clone());
        true
    }

    fn invalidate_once(&self, handle: &TxHandle) {
        if self.mark_settled(handle) {
            self.invalidate_caches();
        }
    }

    fn invalidate_caches(&self) {
        for cache in &self.caches {
            cache.invalidate();
        }
        debug!(target: LOG_TARGET, caches = self.caches.len(), evt = "INVALIDATED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{claim_rewards_request, stake_request};
    use crate::amount::ScaledAmount;
    use crate::cache::CacheSlot;
    use crate::testing::{FakeSettlement, RecordingNotifier};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        settlement: Arc<FakeSettlement>,
        notifier: Arc<RecordingNotifier>,
        cache: Arc<CacheSlot>,
        callbacks: Arc<AtomicUsize>,
        lifecycle: Arc<TxLifecycle>,
    }

    fn harness(settlement: FakeSettlement) -> Harness {
        let settlement = Arc::new(settlement);
        let notifier = Arc::new(RecordingNotifier::default());
        let cache = Arc::new(CacheSlot::new("balances"));
        let callbacks = Arc::new(AtomicUsize::new(0));
        let counter = callbacks.clone();
        let lifecycle = TxLifecycle::new("Stake USDX", settlement.clone(), notifier.clone())
            .with_cache(cache.clone())
            .with_chain_id(1)
            .with_confirmation_timeout(Duration::from_secs(30))
            .on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        Harness {
            settlement,
            notifier,
            cache,
            callbacks,
            lifecycle: Arc::new(lifecycle),
        }
    }

    async fn wait_for_status(lifecycle: &TxLifecycle, status: TxStatus) {
        for _ in 0..100 {
            if lifecycle.status() == status {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("status never reached {status:?}");
    }

    #[tokio::test]
    async fn confirmed_runs_side_effects_once() {
        let h = harness(FakeSettlement::new());
        let outcome = h.lifecycle.execute(stake_request(ScaledAmount::from_units(5, 18))).await;
        let ExecuteOutcome::Confirmed(handle) = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(h.lifecycle.status(), TxStatus::Success);
        assert_eq!(h.lifecycle.handle(), Some(handle.clone()));
        assert_eq!(h.notifier.titles(), vec!["Transaction submitted", "Stake USDX confirmed!"]);
        let submitted = h.notifier.notifications.lock().unwrap()[0].clone();
        assert_eq!(submitted.description.as_deref(), Some("Stake USDX is being confirmed..."));
        assert_eq!(
            submitted.action.map(|a| a.url),
            Some(format!("https://etherscan.io/tx/{handle}"))
        );
        assert_eq!(h.notifier.pulses.load(Ordering::SeqCst), 1);
        assert_eq!(h.cache.generation(), 1);
        assert_eq!(h.callbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_handle_does_not_repeat_side_effects() {
        let h = harness(FakeSettlement::new());
        h.settlement.push_submit(Ok(TxHandle::new("0xdup")));
        h.settlement.push_submit(Ok(TxHandle::new("0xdup")));
        h.lifecycle.execute(claim_rewards_request()).await;
        let again = h.lifecycle.execute(claim_rewards_request()).await;
        assert_eq!(again, ExecuteOutcome::Confirmed(TxHandle::new("0xdup")));
        assert_eq!(h.cache.generation(), 1);
        assert_eq!(h.callbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_is_recorded_but_not_notified() {
        let h = harness(FakeSettlement::new());
        h.settlement
            .push_submit(Err(SettlementError::Message("User rejected the request.".into())));
        let outcome = h.lifecycle.execute(claim_rewards_request()).await;
        assert!(matches!(outcome, ExecuteOutcome::Failed(ref e) if e.is_user_rejection()));
        let submission = h.lifecycle.submission();
        assert_eq!(submission.status, TxStatus::Error);
        assert_eq!(submission.error_message.as_deref(), Some("Transaction rejected in wallet."));
        assert!(h.notifier.titles().is_empty());
        assert_eq!(h.cache.generation(), 0);
        assert_eq!(h.settlement.wait_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn revert_is_notified_without_success_effects() {
        let h = harness(FakeSettlement::new());
        h.settlement.push_confirmation(Err(SettlementError::Contract {
            name: "CooldownNotElapsed".into(),
        }));
        let outcome = h.lifecycle.execute(claim_rewards_request()).await;
        assert!(matches!(outcome, ExecuteOutcome::Failed(_)));
        assert_eq!(h.notifier.titles(), vec!["Transaction submitted", "Stake USDX failed"]);
        let last = h.notifier.notifications.lock().unwrap()[1].clone();
        assert_eq!(last.description.as_deref(), Some("Cooldown period has not completed yet."));
        assert_eq!(h.notifier.pulses.load(Ordering::SeqCst), 0);
        assert_eq!(h.cache.generation(), 0);
        assert_eq!(h.callbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_execute_while_pending_is_ignored() {
        let h = harness(FakeSettlement::new().holding_confirmations());
        let first = tokio::spawn({
            let lifecycle = h.lifecycle.clone();
            async move { lifecycle.execute(claim_rewards_request()).await }
        });
        wait_for_status(&h.lifecycle, TxStatus::Pending).await;
        let handle = h.lifecycle.handle();

        let second = h.lifecycle.execute(claim_rewards_request()).await;
        assert_eq!(second, ExecuteOutcome::Ignored);
        assert_eq!(h.lifecycle.handle(), handle);
        assert_eq!(h.settlement.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.settlement.wait_calls.load(Ordering::SeqCst), 1);

        h.settlement.release_confirmation();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Confirmed(_)));
        assert_eq!(h.settlement.wait_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_wait_is_bounded() {
        let h = harness(FakeSettlement::new().holding_confirmations());
        let outcome = h.lifecycle.execute(claim_rewards_request()).await;
        let ExecuteOutcome::Failed(err) = outcome else {
            panic!("expected timeout failure");
        };
        assert_eq!(err.message, "Timed out waiting for confirmation after 30s.");
        assert_eq!(h.lifecycle.status(), TxStatus::Error);
        assert_eq!(h.cache.generation(), 0);
    }

    #[tokio::test]
    async fn reset_while_pending_still_invalidates_once() {
        let h = harness(FakeSettlement::new().holding_confirmations());
        let first = tokio::spawn({
            let lifecycle = h.lifecycle.clone();
            async move { lifecycle.execute(claim_rewards_request()).await }
        });
        wait_for_status(&h.lifecycle, TxStatus::Pending).await;
        h.lifecycle.reset();
        assert_eq!(h.lifecycle.submission().status, TxStatus::Idle);
        assert_eq!(h.lifecycle.handle(), None);

        h.settlement.release_confirmation();
        assert_eq!(first.await.unwrap(), ExecuteOutcome::Detached);
        assert_eq!(h.lifecycle.status(), TxStatus::Idle);
        assert_eq!(h.cache.generation(), 1);
        assert_eq!(h.callbacks.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.pulses.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.titles(), vec!["Transaction submitted"]);
    }

    #[tokio::test]
    async fn second_execute_while_prompting_is_ignored() {
        let h = harness(FakeSettlement::new().holding_submits());
        let first = tokio::spawn({
            let lifecycle = h.lifecycle.clone();
            async move { lifecycle.execute(claim_rewards_request()).await }
        });
        wait_for_status(&h.lifecycle, TxStatus::Prompting).await;
        assert_eq!(h.settlement.submit_calls.load(Ordering::SeqCst), 1);

        let second = h.lifecycle.execute(claim_rewards_request()).await;
        assert_eq!(second, ExecuteOutcome::Ignored);
        assert_eq!(h.lifecycle.status(), TxStatus::Prompting);
        assert_eq!(h.settlement.submit_calls.load(Ordering::SeqCst), 1);

        h.settlement.release_submit();
        assert!(matches!(first.await.unwrap(), ExecuteOutcome::Confirmed(_)));
        assert_eq!(h.settlement.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_while_prompting_swallows_signer_failure() {
        let h = harness(FakeSettlement::new().holding_submits());
        h.settlement.push_submit(Err(SettlementError::Opaque));
        let first = tokio::spawn({
            let lifecycle = h.lifecycle.clone();
            async move { lifecycle.execute(claim_rewards_request()).await }
        });
        wait_for_status(&h.lifecycle, TxStatus::Prompting).await;
        h.lifecycle.reset();

        h.settlement.release_submit();
        assert_eq!(first.await.unwrap(), ExecuteOutcome::Detached);
        let submission = h.lifecycle.submission();
        assert_eq!(submission.status, TxStatus::Idle);
        assert_eq!(submission.error_message, None);
        assert!(h.notifier.titles().is_empty());
        assert_eq!(h.settlement.wait_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.cache.generation(), 0);
    }

    #[tokio::test]
    async fn execute_after_success_starts_fresh() {
        let h = harness(FakeSettlement::new());
        let ExecuteOutcome::Confirmed(first) = h.lifecycle.execute(claim_rewards_request()).await else {
            panic!("expected first confirmation");
        };
        assert_eq!(h.lifecycle.status(), TxStatus::Success);

        let ExecuteOutcome::Confirmed(second) = h.lifecycle.execute(claim_rewards_request()).await else {
            panic!("expected second confirmation");
        };
        assert_ne!(first, second);
        assert_eq!(h.lifecycle.handle(), Some(second));
        assert_eq!(
            h.notifier.titles(),
            vec![
                "Transaction submitted",
                "Stake USDX confirmed!",
                "Transaction submitted",
                "Stake USDX confirmed!",
            ]
        );
        assert_eq!(h.notifier.pulses.load(Ordering::SeqCst), 2);
        assert_eq!(h.cache.generation(), 2);
        assert_eq!(h.callbacks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn only_the_latest_settled_handle_is_remembered() {
        let h = harness(FakeSettlement::new());
        for handle in ["0xa", "0xb", "0xb", "0xa"] {
            h.settlement.push_submit(Ok(TxHandle::new(handle)));
            h.lifecycle.execute(claim_rewards_request()).await;
        }
        assert_eq!(*h.lifecycle.last_settled.lock().unwrap(), Some(TxHandle::new("0xa")));
        assert_eq!(h.callbacks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn execute_allowed_again_after_error() {
        let h = harness(FakeSettlement::new());
        h.settlement.push_submit(Err(SettlementError::Opaque));
        assert!(matches!(
            h.lifecycle.execute(claim_rewards_request()).await,
            ExecuteOutcome::Failed(_)
        ));
        assert!(matches!(
            h.lifecycle.execute(claim_rewards_request()).await,
            ExecuteOutcome::Confirmed(_)
        ));
        assert_eq!(h.lifecycle.submission().error_message, None);
    }
}
