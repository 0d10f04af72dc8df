//! Per-account balances, allowance and staking position.

use crate::amount::ScaledAmount;
use crate::errors::SettlementError;
use crate::settlement::{Address, ContractId, ReadCall, ReadValue, ReturnShape, Settlement};
use serde::Serialize;

/// Wallet balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Balances {
    /// Native ETH.
    pub eth: ScaledAmount,
    /// USDX token balance.
    pub usdx: ScaledAmount,
}

/// Reads ETH and USDX balances for `account`.
pub async fn fetch_balances(settlement: &dyn Settlement, account: Address) -> Result<Balances, SettlementError> {
    let usdx_call = ReadCall::new(ContractId::StableCoin, "balanceOf", ReturnShape::Uint).arg(account);
    let (eth, usdx) = futures::try_join!(settlement.native_balance(&account), settlement.read(&usdx_call))?;
    Ok(Balances {
        eth,
        usdx: expect_amount("balanceOf", &usdx)?,
    })
}

/// USDX spending allowance granted to a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Allowance(pub ScaledAmount);

impl Allowance {
    /// Whether `amount` can be spent without a new approval.
    pub fn covers(&self, amount: ScaledAmount) -> bool {
        self.0 >= amount
    }
}

/// Reads `allowance(owner, spender)` on the USDX token.
pub async fn fetch_allowance(
    settlement: &dyn Settlement,
    owner: Address,
    spender: Address,
) -> Result<Allowance, SettlementError> {
    let call = ReadCall::new(ContractId::StableCoin, "allowance", ReturnShape::Uint)
        .arg(owner)
        .arg(spender);
    let value = settlement.read(&call).await?;
    expect_amount("allowance", &value).map(Allowance)
}

/// Staked USDX and accrued ETH rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StakingPosition {
    /// USDX currently staked.
    pub staked: ScaledAmount,
    /// ETH rewards claimable now.
    pub pending_rewards: ScaledAmount,
}

/// Reads `stakes(account)` and `pendingRewards(account)`.
pub async fn fetch_position(settlement: &dyn Settlement, account: Address) -> Result<StakingPosition, SettlementError> {
    let stakes = ReadCall::new(ContractId::StakingRewards, "stakes", ReturnShape::Uint).arg(account);
    let rewards = ReadCall::new(ContractId::StakingRewards, "pendingRewards", ReturnShape::Uint).arg(account);
    let (stakes, rewards) = futures::try_join!(settlement.read(&stakes), settlement.read(&rewards))?;
    Ok(StakingPosition {
        staked: staked_amount(&stakes)?,
        pending_rewards: expect_amount("pendingRewards", &rewards)?,
    })
}

/// `stakes` returns either the bare amount or a struct whose first field is
/// the amount.
fn staked_amount(value: &ReadValue) -> Result<ScaledAmount, SettlementError> {
    value
        .as_amount()
        .or_else(|| value.field(0, "amount").and_then(ReadValue::as_amount))
        .ok_or_else(|| SettlementError::Decode(format!("stakes: unexpected shape {value:?}")))
}

fn expect_amount(function: &str, value: &ReadValue) -> Result<ScaledAmount, SettlementError> {
    value
        .as_amount()
        .ok_or_else(|| SettlementError::Decode(format!("{function}: expected uint256, got {value:?}")))
}
