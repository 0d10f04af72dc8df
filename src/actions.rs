//! Write requests for each protocol action and the trade and stake button
//! gates.

use crate::amount::{self, ScaledAmount, DEFAULT_DECIMALS};
use crate::format::{format_eth, format_percent, format_token};
use crate::lifecycle::TxStatus;
use crate::quote::{Quote, TradeDirection};
use crate::settlement::{Address, ContractId, SubmitRequest};
use crate::slippage::{min_acceptable, SlippageTolerance};
use serde::Serialize;

/// Lifecycle label for minting.
pub const MINT_USDX: &str = "Mint USDX";
/// Lifecycle label for redeeming.
pub const REDEEM_ETH: &str = "Redeem ETH";
/// Lifecycle label for approvals.
pub const APPROVE_USDX: &str = "Approve USDX";
/// Lifecycle label for staking.
pub const STAKE_USDX: &str = "Stake USDX";
/// Lifecycle label for starting an unstake.
pub const INITIATE_UNSTAKE: &str = "Initiate Unstake";
/// Lifecycle label for finishing an unstake.
pub const COMPLETE_UNSTAKE: &str = "Complete Unstake";
/// Lifecycle label for claiming rewards.
pub const CLAIM_REWARDS: &str = "Claim Rewards";
/// Lifecycle label for pushing an oracle update.
pub const UPDATE_PRICE: &str = "Update Price";

/// Accepts `0x` followed by exactly 40 hex digits.
pub fn parse_referrer(candidate: &str) -> Option<Address> {
    let raw = candidate.strip_prefix("0x")?;
    if raw.len() != 40 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    candidate.parse().ok()
}

/// Referrer to attach, falling back to the zero address.
pub fn referrer_or_default(candidate: Option<&str>) -> Address {
    candidate.and_then(parse_referrer).unwrap_or(Address::ZERO)
}

/// `mint(minOut, referrer)` paying `eth_cost`.
pub fn mint_request(min_out: ScaledAmount, referrer: Address, eth_cost: ScaledAmount) -> SubmitRequest {
    SubmitRequest::new(ContractId::BondingCurve, "mint")
        .arg(min_out)
        .arg(referrer)
        .with_value(eth_cost)
}

/// `redeem(tokensIn, minOut, referrer)`.
pub fn redeem_request(tokens_in: ScaledAmount, min_out: ScaledAmount, referrer: Address) -> SubmitRequest {
    SubmitRequest::new(ContractId::BondingCurve, "redeem")
        .arg(tokens_in)
        .arg(min_out)
        .arg(referrer)
}

/// `approve(spender, amount)` on the USDX token.
pub fn approve_request(spender: Address, amount: ScaledAmount) -> SubmitRequest {
    SubmitRequest::new(ContractId::StableCoin, "approve")
        .arg(spender)
        .arg(amount)
}

/// `stake(amount)`.
pub fn stake_request(amount: ScaledAmount) -> SubmitRequest {
    SubmitRequest::new(ContractId::StakingRewards, "stake").arg(amount)
}

/// `initiateUnstake(amount)`.
pub fn initiate_unstake_request(amount: ScaledAmount) -> SubmitRequest {
    SubmitRequest::new(ContractId::StakingRewards, "initiateUnstake").arg(amount)
}

/// `completeUnstake(index)`.
pub fn complete_unstake_request(index: usize) -> SubmitRequest {
    SubmitRequest::new(ContractId::StakingRewards, "completeUnstake").arg(index as u64)
}

/// `claimRewards()`.
pub fn claim_rewards_request() -> SubmitRequest {
    SubmitRequest::new(ContractId::StakingRewards, "claimRewards")
}

/// `updatePrice()`.
pub fn update_price_request() -> SubmitRequest {
    SubmitRequest::new(ContractId::BondingCurve, "updatePrice")
}

/// Minimum output for a trade.  Mint protects the requested USDX amount,
/// redeem protects the quoted ETH out.
pub fn trade_min_out(
    direction: TradeDirection,
    amount: ScaledAmount,
    quote: Option<&Quote>,
    tolerance: SlippageTolerance,
) -> ScaledAmount {
    match direction {
        TradeDirection::Mint => min_acceptable(amount, tolerance),
        TradeDirection::Redeem => quote
            .map(|q| min_acceptable(q.counter_amount, tolerance))
            .unwrap_or_default(),
    }
}

/// Builds the mint or redeem request for a quoted amount.
pub fn trade_request(
    direction: TradeDirection,
    amount: ScaledAmount,
    quote: &Quote,
    tolerance: SlippageTolerance,
    referrer: Address,
) -> SubmitRequest {
    let min_out = trade_min_out(direction, amount, Some(quote), tolerance);
    match direction {
        TradeDirection::Mint => mint_request(min_out, referrer, quote.counter_amount),
        TradeDirection::Redeem => redeem_request(amount, min_out, referrer),
    }
}

/// Lifecycle label of a trade.
pub fn trade_label(direction: TradeDirection) -> &'static str {
    match direction {
        TradeDirection::Mint => MINT_USDX,
        TradeDirection::Redeem => REDEEM_ETH,
    }
}

/// Redeeming spends USDX through the bonding curve and needs an allowance.
pub fn needs_approval(direction: TradeDirection, amount: ScaledAmount, allowance: ScaledAmount) -> bool {
    direction == TradeDirection::Redeem && !amount.is_zero() && allowance < amount
}

/// Inputs to the trade button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeContext {
    /// State of the trade lifecycle.
    pub status: TxStatus,
    /// Protocol paused.
    pub paused: bool,
    /// Mint or redeem.
    pub direction: TradeDirection,
    /// Entered amount.
    pub amount: ScaledAmount,
    /// Quoted ETH cost for a mint.
    pub eth_cost: Option<ScaledAmount>,
    /// Wallet ETH.
    pub eth_balance: ScaledAmount,
    /// Wallet USDX.
    pub usdx_balance: ScaledAmount,
    /// Current USDX allowance for the bonding curve.
    pub allowance: ScaledAmount,
}

/// What the trade button shows and does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeGate {
    /// Signer prompt open.
    AwaitingWallet,
    /// Waiting for inclusion.
    Confirming,
    /// Trading halted.
    Paused,
    /// No amount entered.
    EnterAmount,
    /// Mint cost exceeds ETH balance.
    InsufficientEth,
    /// Redeem amount exceeds USDX balance.
    InsufficientUsdx,
    /// Allowance must be raised first.
    Approve,
    /// Ready to submit.
    Ready(TradeDirection),
}

impl TradeGate {
    /// Button text.
    pub fn label(&self) -> &'static str {
        match self {
            TradeGate::AwaitingWallet => "Waiting for wallet...",
            TradeGate::Confirming => "Confirming...",
            TradeGate::Paused => "Protocol Paused",
            TradeGate::EnterAmount => "Enter Amount",
            TradeGate::InsufficientEth => "Insufficient ETH",
            TradeGate::InsufficientUsdx => "Insufficient USDX",
            TradeGate::Approve => APPROVE_USDX,
            TradeGate::Ready(direction) => trade_label(*direction),
        }
    }

    /// Whether the button can be pressed.
    pub fn is_enabled(&self) -> bool {
        matches!(self, TradeGate::Approve | TradeGate::Ready(_))
    }
}

/// Evaluates the gate in precedence order.
pub fn gate_trade(ctx: &TradeContext) -> TradeGate {
    match ctx.status {
        TxStatus::Prompting => return TradeGate::AwaitingWallet,
        TxStatus::Pending => return TradeGate::Confirming,
        _ => {}
    }
    if ctx.paused {
        return TradeGate::Paused;
    }
    if ctx.amount.is_zero() {
        return TradeGate::EnterAmount;
    }
    match ctx.direction {
        TradeDirection::Mint => {
            if ctx.eth_cost.is_some_and(|cost| cost > ctx.eth_balance) {
                return TradeGate::InsufficientEth;
            }
        }
        TradeDirection::Redeem => {
            if ctx.amount > ctx.usdx_balance {
                return TradeGate::InsufficientUsdx;
            }
            if needs_approval(ctx.direction, ctx.amount, ctx.allowance) {
                return TradeGate::Approve;
            }
        }
    }
    TradeGate::Ready(ctx.direction)
}

/// Rate, fee, floor and tolerance shown beside a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapDetails {
    /// `1 ETH ≈ 2,000 USDX` or `1 USDX ≈ 0.0005 ETH`; absent without a price.
    pub rate: Option<String>,
    /// Redeem fee, when there is one.
    pub fee: Option<String>,
    /// Slippage floor the request will carry.
    pub min_out: ScaledAmount,
    /// The floor with its symbol.
    pub min_received: String,
    /// Tolerance as a percentage.
    pub slippage: String,
}

/// Details for a quoted trade; `None` until an amount is entered.
///
/// `eth_price` is the oracle price, USDX per ETH with 18 decimals.
pub fn swap_details(
    direction: TradeDirection,
    amount: ScaledAmount,
    quote: Option<&Quote>,
    eth_price: ScaledAmount,
    tolerance: SlippageTolerance,
) -> Option<SwapDetails> {
    if amount.is_zero() {
        return None;
    }
    let min_out = trade_min_out(direction, amount, quote, tolerance);
    let priced = !eth_price.is_zero();
    let (rate, fee, min_received) = match direction {
        TradeDirection::Mint => (
            priced.then(|| format!("1 ETH ≈ {} USDX", amount::format(eth_price, DEFAULT_DECIMALS, 2))),
            None,
            format_token(min_out, "USDX", 4),
        ),
        TradeDirection::Redeem => {
            let rate = priced.then(|| {
                let unit = amount::pow10(DEFAULT_DECIMALS);
                let per_usdx = ScaledAmount::from_raw(unit * unit / eth_price.raw());
                format!("1 USDX ≈ {} ETH", amount::format(per_usdx, DEFAULT_DECIMALS, 6))
            });
            let fee = quote.filter(|q| !q.fee.is_zero()).map(|q| format_eth(q.fee));
            (rate, fee, format_token(min_out, "ETH", 6))
        }
    };
    Some(SwapDetails {
        rate,
        fee,
        min_out,
        min_received,
        slippage: format_percent(u64::from(tolerance.bps())),
    })
}

/// Which staking tab is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeMode {
    /// Lock USDX.
    Stake,
    /// Start the cooldown on staked USDX.
    Unstake,
}

impl StakeMode {
    /// Lifecycle label of the submission this tab makes.
    pub fn label(self) -> &'static str {
        match self {
            StakeMode::Stake => STAKE_USDX,
            StakeMode::Unstake => INITIATE_UNSTAKE,
        }
    }
}

/// Inputs to the stake button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeContext {
    /// State of the active lifecycle.
    pub status: TxStatus,
    /// Stake or unstake.
    pub mode: StakeMode,
    /// Entered amount.
    pub amount: ScaledAmount,
    /// Wallet USDX.
    pub usdx_balance: ScaledAmount,
    /// USDX currently staked.
    pub staked: ScaledAmount,
    /// Current USDX allowance for the staking contract.
    pub allowance: ScaledAmount,
}

/// What the stake button shows and does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StakeGate {
    /// Signer prompt open.
    AwaitingWallet,
    /// Waiting for inclusion.
    Confirming,
    /// No amount entered.
    EnterAmount,
    /// Stake amount exceeds USDX balance.
    InsufficientUsdx,
    /// Unstake amount exceeds the staked balance.
    InsufficientStaked,
    /// Staking contract allowance must be raised first.
    Approve,
    /// Ready to submit.
    Ready(StakeMode),
}

impl StakeGate {
    /// Button text.
    pub fn label(&self) -> &'static str {
        match self {
            StakeGate::AwaitingWallet => "Waiting for wallet...",
            StakeGate::Confirming => "Confirming...",
            StakeGate::EnterAmount => "Enter Amount",
            StakeGate::InsufficientUsdx => "Insufficient USDX",
            StakeGate::InsufficientStaked => "Insufficient Staked Balance",
            StakeGate::Approve => APPROVE_USDX,
            StakeGate::Ready(mode) => mode.label(),
        }
    }

    /// Whether the button can be pressed.
    pub fn is_enabled(&self) -> bool {
        matches!(self, StakeGate::Approve | StakeGate::Ready(_))
    }
}

/// Evaluates the stake button in precedence order.  Only staking needs an
/// allowance; unstaking checks the staked balance alone.
pub fn gate_stake(ctx: &StakeContext) -> StakeGate {
    match ctx.status {
        TxStatus::Prompting => return StakeGate::AwaitingWallet,
        TxStatus::Pending => return StakeGate::Confirming,
        _ => {}
    }
    if ctx.amount.is_zero() {
        return StakeGate::EnterAmount;
    }
    match ctx.mode {
        StakeMode::Stake => {
            if ctx.amount > ctx.usdx_balance {
                return StakeGate::InsufficientUsdx;
            }
            if ctx.allowance < ctx.amount {
                return StakeGate::Approve;
            }
        }
        StakeMode::Unstake => {
            if ctx.amount > ctx.staked {
                return StakeGate::InsufficientStaked;
            }
        }
    }
    StakeGate::Ready(ctx.mode)
}
