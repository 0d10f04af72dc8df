//! In-memory collaborators for unit tests.

use crate::amount::ScaledAmount;
use crate::errors::SettlementError;
use crate::notify::{Notification, NotificationSink};
use crate::settlement::{Address, CallArg, Clock, ReadCall, ReadValue, Receipt, Settlement, SubmitRequest, TxHandle};
use crate::u256::U256;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

type ReadFn = Box<dyn Fn(&ReadCall) -> Result<ReadValue, SettlementError> + Send + Sync>;

/// Scriptable settlement layer.
pub(crate) struct FakeSettlement {
    reads: ReadFn,
    read_delays: Mutex<HashMap<U256, Duration>>,
    submit_results: Mutex<VecDeque<Result<TxHandle, SettlementError>>>,
    confirm_results: Mutex<VecDeque<Result<(), SettlementError>>>,
    hold_confirmations: bool,
    confirm_gate: Semaphore,
    hold_submits: bool,
    submit_gate: Semaphore,
    balance: ScaledAmount,
    pub read_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub wait_calls: AtomicUsize,
    pub submitted: Mutex<Vec<SubmitRequest>>,
}

impl FakeSettlement {
    pub fn new() -> Self {
        Self::with_reads(|call| Err(SettlementError::Message(format!("no read for {}", call.function))))
    }

    pub fn with_reads<F>(reads: F) -> Self
    where
        F: Fn(&ReadCall) -> Result<ReadValue, SettlementError> + Send + Sync + 'static,
    {
        Self {
            reads: Box::new(reads),
            read_delays: Mutex::new(HashMap::new()),
            submit_results: Mutex::new(VecDeque::new()),
            confirm_results: Mutex::new(VecDeque::new()),
            hold_confirmations: false,
            confirm_gate: Semaphore::new(0),
            hold_submits: false,
            submit_gate: Semaphore::new(0),
            balance: ScaledAmount::zero(),
            read_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            wait_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Confirmations block until [`release_confirmation`](Self::release_confirmation).
    pub fn holding_confirmations(mut self) -> Self {
        self.hold_confirmations = true;
        self
    }

    /// Submits stay at the signer until [`release_submit`](Self::release_submit).
    pub fn holding_submits(mut self) -> Self {
        self.hold_submits = true;
        self
    }

    pub fn with_balance(mut self, balance: ScaledAmount) -> Self {
        self.balance = balance;
        self
    }

    /// Delays reads whose first argument equals `amount`.
    pub fn delay_read(&self, amount: U256, delay: Duration) {
        self.read_delays.lock().unwrap().insert(amount, delay);
    }

    pub fn push_submit(&self, result: Result<TxHandle, SettlementError>) {
        self.submit_results.lock().unwrap().push_back(result);
    }

    pub fn push_confirmation(&self, result: Result<(), SettlementError>) {
        self.confirm_results.lock().unwrap().push_back(result);
    }

    pub fn release_confirmation(&self) {
        self.confirm_gate.add_permits(1);
    }

    pub fn release_submit(&self) {
        self.submit_gate.add_permits(1);
    }
}

#[async_trait]
impl Settlement for FakeSettlement {
    async fn read(&self, call: &ReadCall) -> Result<ReadValue, SettlementError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let delay = match call.args.first() {
            Some(CallArg::Uint(amount)) => self.read_delays.lock().unwrap().get(amount).copied(),
            _ => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        (self.reads)(call)
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<TxHandle, SettlementError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(request.clone());
        if self.hold_submits {
            let permit = self.submit_gate.acquire().await.map_err(|_| SettlementError::Opaque)?;
            permit.forget();
        }
        let scripted = self.submit_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(TxHandle::new(format!("0x{:064x}", n + 1))))
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, SettlementError> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_confirmations {
            let permit = self.confirm_gate.acquire().await.map_err(|_| SettlementError::Opaque)?;
            permit.forget();
        }
        let scripted = self.confirm_results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(())).map(|()| Receipt {
            handle: handle.clone(),
            block_number: Some(1),
        })
    }

    async fn native_balance(&self, _account: &Address) -> Result<ScaledAmount, SettlementError> {
        Ok(self.balance)
    }
}

/// Records everything it is told.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub notifications: Mutex<Vec<Notification>>,
    pub pulses: AtomicUsize,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    fn pulse(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }
}

/// Settable clock.
pub(crate) struct FixedClock(pub AtomicU64);

impl FixedClock {
    pub fn at(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// `uint256` read value.
pub(crate) fn uint(v: u64) -> ReadValue {
    ReadValue::Uint(U256::from(v))
}

/// `uint256` read value from whole tokens.
pub(crate) fn tokens(units: u64) -> ReadValue {
    ReadValue::Uint(ScaledAmount::from_units(units, 18).raw())
}
