//! Settlement failures and their translation into user-facing messages.

use crate::abi;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Shown when the signer declines a request.
pub const USER_REJECTED_MESSAGE: &str = "Transaction rejected in wallet.";
/// Shown when the account cannot pay for gas.
pub const INSUFFICIENT_GAS_MESSAGE: &str = "Insufficient ETH for gas fees.";
/// Shown when a failure carries nothing recognisable.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Failure reported by a settlement collaborator.
///
/// The variants carry exactly the shapes [`classify`] inspects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Structured revert that names the contract error.
    #[error("contract reverted with {name}")]
    Contract {
        /// Custom error name, e.g. `SlippageExceeded`.
        name: String,
    },
    /// Revert surfaced only as a short human message.
    #[error("{short_message}")]
    Revert {
        /// e.g. `reverted with custom error OracleStale()`.
        short_message: String,
    },
    /// Failure carrying a free-form message.
    #[error("{0}")]
    Message(String),
    /// Bare string thrown by the collaborator.
    #[error("{0}")]
    Text(String),
    /// Transport could not reach the node.
    #[error("rpc transport failure: {0}")]
    Transport(String),
    /// Node answered with something that does not fit the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
    /// Confirmation did not arrive within the configured bound.
    #[error("Timed out waiting for confirmation after {}s.", .0.as_secs())]
    Timeout(Duration),
    /// Nothing inspectable.
    #[error("unexpected failure")]
    Opaque,
}

/// Category a failure classifies into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Signer declined.
    UserRejected,
    /// Not enough ETH for gas.
    InsufficientGasFunds,
    /// A contract custom error, by name.
    NamedContractError(String),
    /// A message passed through verbatim.
    UnclassifiedRevertMessage,
    /// Nothing recognisable.
    UnknownError,
}

/// A failure ready to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    /// Category.
    pub kind: ErrorKind,
    /// Display text.
    pub message: String,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True when the signer declined the request.
    pub fn is_user_rejection(&self) -> bool {
        self.kind == ErrorKind::UserRejected
    }
}

/// One row of the contract error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error name as declared in the contract.
    pub name: &'static str,
    /// Canonical signature used to derive the 4-byte selector.
    pub signature: &'static str,
    /// User-facing message.
    pub message: &'static str,
}

const fn row(name: &'static str, signature: &'static str, message: &'static str) -> ContractErrorInfo {
    ContractErrorInfo {
        name,
        signature,
        message,
    }
}

/// Known contract errors.
pub static CONTRACT_ERRORS: &[ContractErrorInfo] = &[
    row("OracleStale", "OracleStale()", "Oracle price is stale. An update is needed before trading."),
    row("VolumeCapExceeded", "VolumeCapExceeded()", "Volume cap reached. Wait for the next oracle update."),
    row("CriticalCR", "CriticalCR()", "Redemptions paused — collateralization ratio is critically low."),
    row("SlippageExceeded", "SlippageExceeded()", "Price moved unfavorably. Try increasing your slippage tolerance."),
    row("BelowMinimumTrade", "BelowMinimumTrade()", "Trade amount is below the minimum ($10)."),
    row("ProtocolPaused", "ProtocolPaused()", "Protocol is currently paused by the admin."),
    row("InsufficientReserves", "InsufficientReserves()", "Not enough reserves to fulfill this redemption."),
    row("NotBootstrapped", "NotBootstrapped()", "Protocol has not been bootstrapped yet."),
    row("AlreadyBootstrapped", "AlreadyBootstrapped()", "Protocol has already been bootstrapped."),
    row("InsufficientBootstrap", "InsufficientBootstrap()", "Insufficient ETH for bootstrap."),
    row("InvalidOraclePrice", "InvalidOraclePrice()", "Oracle returned an invalid price."),
    row("OraclePriceOutOfBounds", "OraclePriceOutOfBounds()", "Oracle price is outside acceptable bounds."),
    row("TransferFailed", "TransferFailed()", "ETH transfer failed. Please try again."),
    row("StakingCapExceeded", "StakingCapExceeded()", "Staking cap reached. Try a smaller amount."),
    row("CooldownNotElapsed", "CooldownNotElapsed()", "Cooldown period has not completed yet."),
    row("InsufficientStake", "InsufficientStake()", "Insufficient staked balance."),
    row("NoRewardsToClaim", "NoRewardsToClaim()", "No pending rewards to claim."),
    row("InvalidUnstakeRequest", "InvalidUnstakeRequest()", "This unstake request is invalid or already completed."),
    row("RequestNotExpired", "RequestNotExpired()", "This unstake request has not expired yet."),
    row(
        "TooManyUnstakeRequests",
        "TooManyUnstakeRequests()",
        "Too many pending unstake requests. Complete or clean up existing ones.",
    ),
    row("BelowMinimum", "BelowMinimum()", "Amount is below the minimum stake."),
    row("Unauthorized", "Unauthorized()", "You are not authorized to perform this action."),
    row("InvalidParameter", "InvalidParameter()", "Invalid parameter provided."),
    row(
        "ReentrancyGuardReentrantCall",
        "ReentrancyGuardReentrantCall()",
        "Transaction rejected — reentrancy detected.",
    ),
    row(
        "ERC20InsufficientBalance",
        "ERC20InsufficientBalance(address,uint256,uint256)",
        "Insufficient token balance.",
    ),
    row(
        "ERC20InsufficientAllowance",
        "ERC20InsufficientAllowance(address,uint256,uint256)",
        "Token approval needed before this transaction.",
    ),
    row("ERC20InvalidApprover", "ERC20InvalidApprover(address)", "Invalid token approver."),
    row("ERC20InvalidReceiver", "ERC20InvalidReceiver(address)", "Invalid token receiver."),
    row("ERC20InvalidSender", "ERC20InvalidSender(address)", "Invalid token sender."),
    row("ERC20InvalidSpender", "ERC20InvalidSpender(address)", "Invalid token spender."),
    row("OnlyMinter", "OnlyMinter()", "Only the minter contract can perform this action."),
    row("OwnableInvalidOwner", "OwnableInvalidOwner(address)", "Invalid owner address."),
    row(
        "OwnableUnauthorizedAccount",
        "OwnableUnauthorizedAccount(address)",
        "Caller is not the contract owner.",
    ),
    row("NoStakers", "NoStakers()", "No stakers in the pool."),
];

static BY_NAME: Lazy<HashMap<&'static str, &'static ContractErrorInfo>> =
    Lazy::new(|| CONTRACT_ERRORS.iter().map(|info| (info.name, info)).collect());

static BY_SELECTOR: Lazy<HashMap<[u8; 4], &'static ContractErrorInfo>> = Lazy::new(|| {
    CONTRACT_ERRORS
        .iter()
        .map(|info| (abi::selector(info.signature), info))
        .collect()
});

/// Message for a known contract error name.
pub fn contract_error_message(name: &str) -> Option<&'static str> {
    BY_NAME.get(name).map(|info| info.message)
}

/// Table row whose selector matches the first four bytes of revert data.
pub fn contract_error_by_selector(selector: [u8; 4]) -> Option<&'static ContractErrorInfo> {
    BY_SELECTOR.get(&selector).copied()
}

/// Pulls `Name` out of text containing `error Name(`.
fn extract_error_name(message: &str) -> Option<&str> {
    for (idx, _) in message.match_indices("error ") {
        let rest = &message[idx + "error ".len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end > 0 && rest[end..].starts_with('(') {
            return Some(&rest[..end]);
        }
    }
    None
}

fn classify_message(message: &str) -> ClassifiedError {
    if message.to_lowercase().contains("user rejected") {
        return ClassifiedError::new(ErrorKind::UserRejected, USER_REJECTED_MESSAGE);
    }
    if message.contains("insufficient funds") {
        return ClassifiedError::new(ErrorKind::InsufficientGasFunds, INSUFFICIENT_GAS_MESSAGE);
    }
    ClassifiedError::new(ErrorKind::UnclassifiedRevertMessage, message)
}

/// Maps a settlement failure onto a user-facing message.  First match wins:
/// named contract error, short revert message, signer rejection, gas funds,
/// free-form message, bare string, then the generic fallback.
pub fn classify(error: &SettlementError) -> ClassifiedError {
    match error {
        SettlementError::Contract { name } => {
            let message = contract_error_message(name)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Contract error: {name}"));
            ClassifiedError::new(ErrorKind::NamedContractError(name.clone()), message)
        }
        SettlementError::Revert { short_message } => match extract_error_name(short_message)
            .and_then(|name| contract_error_message(name).map(|msg| (name, msg)))
        {
            Some((name, message)) => {
                ClassifiedError::new(ErrorKind::NamedContractError(name.to_string()), message)
            }
            None => ClassifiedError::new(ErrorKind::UnclassifiedRevertMessage, short_message.as_str()),
        },
        SettlementError::Message(_)
        | SettlementError::Transport(_)
        | SettlementError::Decode(_)
        | SettlementError::Timeout(_) => classify_message(&error.to_string()),
        SettlementError::Text(text) => {
            ClassifiedError::new(ErrorKind::UnclassifiedRevertMessage, text.as_str())
        }
        SettlementError::Opaque => {
            ClassifiedError::new(ErrorKind::UnknownError, UNEXPECTED_ERROR_MESSAGE)
        }
    }
}
