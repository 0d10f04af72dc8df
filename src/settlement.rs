//! Collaborator interface to the settlement layer.
//!
//! Everything the client knows about the chain flows through the
//! [`Settlement`] trait: contract reads, transaction submission, and
//! confirmation waits.  Read results are modelled as the tagged union
//! [`ReadValue`] so that positional tuples and named records are adapted
//! explicitly at the boundary instead of probed field by field.

use crate::amount::ScaledAmount;
use crate::errors::SettlementError;
use crate::u256::U256;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// 20-byte account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; 20]);

/// Raised when text is not `0x` followed by exactly 40 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address: {0}")]
pub struct AddressParseError(pub String);

impl Address {
    /// The all-zero address, used as the "no referrer" marker.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true for the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        if raw.len() != 40 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError(s.to_string()));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(raw, &mut out).map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Protocol contracts the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContractId {
    /// USDX ERC-20 token.
    StableCoin,
    /// Mint/redeem pricing curve.
    BondingCurve,
    /// ETH reserve accounting.
    ReserveManager,
    /// USDX staking with ETH rewards.
    StakingRewards,
}

/// Static ABI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// `uint256`
    Uint(U256),
    /// `address`
    Address(Address),
    /// `bool`
    Bool(bool),
}

impl CallArg {
    /// Solidity type name used in the function signature.
    pub fn abi_type(&self) -> &'static str {
        match self {
            CallArg::Uint(_) => "uint256",
            CallArg::Address(_) => "address",
            CallArg::Bool(_) => "bool",
        }
    }
}

impl From<ScaledAmount> for CallArg {
    fn from(amount: ScaledAmount) -> Self {
        CallArg::Uint(amount.raw())
    }
}

impl From<U256> for CallArg {
    fn from(value: U256) -> Self {
        CallArg::Uint(value)
    }
}

impl From<u64> for CallArg {
    fn from(value: u64) -> Self {
        CallArg::Uint(U256::from(value))
    }
}

impl From<Address> for CallArg {
    fn from(value: Address) -> Self {
        CallArg::Address(value)
    }
}

/// Expected shape of a read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// Single `uint256` word.
    Uint,
    /// Single `bool` word.
    Bool,
    /// Single `address` word.
    Address,
    /// Positional tuple of values.
    Tuple(Vec<ReturnShape>),
    /// Struct with named fields.
    Record(Vec<(&'static str, ReturnShape)>),
    /// Dynamic array.
    List(Box<ReturnShape>),
}

impl ReturnShape {
    /// Number of head words a static value occupies, or `None` if dynamic.
    pub fn static_words(&self) -> Option<usize> {
        match self {
            ReturnShape::Uint | ReturnShape::Bool | ReturnShape::Address => Some(1),
            ReturnShape::Tuple(fields) => fields.iter().map(ReturnShape::static_words).sum(),
            ReturnShape::Record(fields) => fields.iter().map(|(_, s)| s.static_words()).sum(),
            ReturnShape::List(_) => None,
        }
    }
}

/// Decoded read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadValue {
    /// `uint256`
    Uint(U256),
    /// `bool`
    Bool(bool),
    /// `address`
    Address(Address),
    /// Positional tuple.
    Tuple(Vec<ReadValue>),
    /// Named record, fields in declaration order.
    Record(Vec<(String, ReadValue)>),
    /// Dynamic array.
    List(Vec<ReadValue>),
}

impl ReadValue {
    /// The value as an unsigned integer.
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            ReadValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a scaled amount.
    pub fn as_amount(&self) -> Option<ScaledAmount> {
        self.as_uint().map(ScaledAmount::from_raw)
    }

    /// The value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ReadValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a list.
    pub fn as_list(&self) -> Option<&[ReadValue]> {
        match self {
            ReadValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Field lookup across both composite shapes: by position for tuples,
    /// by name for records.
    pub fn field(&self, index: usize, name: &str) -> Option<&ReadValue> {
        match self {
            ReadValue::Tuple(items) => items.get(index),
            ReadValue::Record(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }
}

/// A contract read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    /// Target contract.
    pub contract: ContractId,
    /// Function name.
    pub function: &'static str,
    /// Arguments in declaration order.
    pub args: Vec<CallArg>,
    /// Expected result shape.
    pub returns: ReturnShape,
}

impl ReadCall {
    /// Builds a zero-argument read.
    pub fn new(contract: ContractId, function: &'static str, returns: ReturnShape) -> Self {
        Self {
            contract,
            function,
            args: Vec::new(),
            returns,
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<CallArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Canonical signature, e.g. `calculateMintCost(uint256)`.
    pub fn signature(&self) -> String {
        signature(self.function, &self.args)
    }
}

/// A state-changing call to be signed and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Target contract.
    pub contract: ContractId,
    /// Function name.
    pub function: &'static str,
    /// Arguments in declaration order.
    pub args: Vec<CallArg>,
    /// ETH attached to the call.
    pub value: Option<ScaledAmount>,
}

impl SubmitRequest {
    /// Builds a zero-argument request with no value attached.
    pub fn new(contract: ContractId, function: &'static str) -> Self {
        Self {
            contract,
            function,
            args: Vec::new(),
            value: None,
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<CallArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Attaches ETH.
    pub fn with_value(mut self, value: ScaledAmount) -> Self {
        self.value = Some(value);
        self
    }

    /// Canonical signature, e.g. `redeem(uint256,uint256,address)`.
    pub fn signature(&self) -> String {
        signature(self.function, &self.args)
    }
}

fn signature(function: &str, args: &[CallArg]) -> String {
    let types: Vec<&str> = args.iter().map(CallArg::abi_type).collect();
    format!("{function}({})", types.join(","))
}

/// Opaque settlement reference for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(String);

impl TxHandle {
    /// Wraps a transaction hash.
    pub fn new(hash: impl Into<String>) -> Self {
        TxHandle(hash.into())
    }

    /// The underlying hash text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settlement confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Confirmed transaction.
    pub handle: TxHandle,
    /// Including block, when reported.
    pub block_number: Option<u64>,
}

/// The external settlement layer.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Executes a read against the current state.
    async fn read(&self, call: &ReadCall) -> Result<ReadValue, SettlementError>;

    /// Requests a signature and broadcasts the call.  Fails synchronously on
    /// signer rejection.
    async fn submit(&self, request: &SubmitRequest) -> Result<TxHandle, SettlementError>;

    /// Waits until the transaction is included, or fails on revert.
    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, SettlementError>;

    /// Native ETH balance of an account.
    async fn native_balance(&self, account: &Address) -> Result<ScaledAmount, SettlementError>;
}

/// Wall clock in unix seconds.
pub trait Clock: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_and_display() {
        let addr: Address = "0xAbCdEfabcdefABCDefAbcdefABcdefabCDefAb12".parse().unwrap();
        assert_eq!(addr.to_string(), "0xabcdefabcdefabcdefabcdefabcdefabcdefab12");
        assert!("abcd".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn signatures_follow_arg_types() {
        let call = ReadCall::new(ContractId::BondingCurve, "calculateMintCost", ReturnShape::Uint)
            .arg(ScaledAmount::zero());
        assert_eq!(call.signature(), "calculateMintCost(uint256)");
        let req = SubmitRequest::new(ContractId::BondingCurve, "redeem")
            .arg(1u64)
            .arg(2u64)
            .arg(Address::ZERO);
        assert_eq!(req.signature(), "redeem(uint256,uint256,address)");
        assert_eq!(
            SubmitRequest::new(ContractId::StakingRewards, "claimRewards").signature(),
            "claimRewards()"
        );
    }

    #[test]
    fn field_adapts_tuple_and_record() {
        let tuple = ReadValue::Tuple(vec![ReadValue::Uint(U256::from(7u64))]);
        let record = ReadValue::Record(vec![("amount".into(), ReadValue::Uint(U256::from(7u64)))]);
        assert_eq!(tuple.field(0, "amount"), record.field(0, "amount"));
        assert_eq!(ReadValue::Bool(true).field(0, "amount"), None);
    }

    #[test]
    fn static_words_counts_heads() {
        let entry = ReturnShape::Record(vec![("amount", ReturnShape::Uint), ("completionTime", ReturnShape::Uint)]);
        assert_eq!(entry.static_words(), Some(2));
        assert_eq!(ReturnShape::List(Box::new(entry)).static_words(), None);
    }
}
