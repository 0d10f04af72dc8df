#![deny(missing_docs)]

//! # usdx_client
//!
//! Client-side logic for the USDX bonding-curve stablecoin: users mint USDX
//! by depositing ETH, redeem USDX for ETH, and stake USDX for ETH rewards.
//! The crate does not sign or settle anything itself.  It shapes requests,
//! tracks them, and turns raw chain state into something safe to show.
//!
//! ## Features
//!
//! * **Exact amounts**: [`amount`] parses and formats 18-decimal quantities
//!   on 256-bit integers with no floating point anywhere.
//! * **Slippage bounds**: [`slippage::min_acceptable`] derives the minimum
//!   output a trade will accept.
//! * **Quotes**: [`quote::QuoteEngine`] keeps a mint or redeem quote current
//!   for the entered amount and drops superseded responses.
//! * **Warnings**: [`warnings::derive_warnings`] maps protocol stats onto
//!   ordered, dismissable health warnings.
//! * **Submission lifecycle**: [`lifecycle::TxLifecycle`] drives one action
//!   from signer prompt to confirmation, then notifies and invalidates the
//!   caches it was built with.
//! * **Unstake queue**: [`unstake`] turns raw cooldown entries into a
//!   display-ready queue.
//! * **JSON-RPC** (feature `rpc`): [`net::JsonRpcSettlement`] implements
//!   the settlement interface over `eth_call` / `eth_sendTransaction`.
//!
//! ## Usage
//!
//! ```rust
//! use usdx_client::{amount, slippage::{min_acceptable, SlippageTolerance}};
//!
//! let wanted = amount::parse("1,000.5", 18);
//! let floor = min_acceptable(wanted, SlippageTolerance::default());
//! assert_eq!(amount::format(floor, 18, 4), "995.4975");
//! ```

pub mod abi;
pub mod account;
pub mod actions;
pub mod amount;
pub mod cache;
pub mod config;
pub mod errors;
pub mod format;
pub mod lifecycle;
pub mod net;
pub mod notify;
pub mod quote;
pub mod session;
pub mod settlement;
pub mod slippage;
pub mod stats;
pub mod u256;
pub mod unstake;
pub mod warnings;

#[cfg(test)]
mod testing;

pub use amount::{AmountInput, ScaledAmount};
pub use config::{ClientConfig, ConfigError, ContractAddresses};
pub use errors::{classify, ClassifiedError, ErrorKind, SettlementError};
pub use lifecycle::{ExecuteOutcome, Submission, TxLifecycle, TxStatus};
pub use notify::{LogNotifier, Notification, NotificationSink, NotifyLevel};
pub use quote::{Quote, QuoteEngine, QuoteView, TradeDirection};
pub use session::{ClientSession, SessionError};
pub use settlement::{Address, Clock, ReadCall, ReadValue, Settlement, SubmitRequest, SystemClock, TxHandle};
pub use slippage::{min_acceptable, SlippageTolerance};
pub use u256::U256;
pub use warnings::{derive_warnings, Warning, WarningSession};
