#![cfg(feature = "rpc")]

//! [`Settlement`] over an Ethereum JSON-RPC endpoint.
//!
//! Reads go through `eth_call`, writes through `eth_sendTransaction` (the
//! node or wallet behind the endpoint holds the key and signs), and
//! confirmations are polled with `eth_getTransactionReceipt`.

use crate::abi::{self, decode_hex_prefixed, encode_hex_prefixed};
use crate::amount::ScaledAmount;
use crate::config::{ClientConfig, ContractAddresses};
use crate::errors::{contract_error_by_selector, SettlementError};
use crate::settlement::{Address, ReadCall, ReadValue, Receipt, Settlement, SubmitRequest, TxHandle};
use crate::u256::U256;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time;
use tracing::{debug, trace};

const LOG_TARGET: &str = "usdx::rpc";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// EIP-1193 code for a request the user declined.
const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC backed settlement layer.
pub struct JsonRpcSettlement {
    client: Client,
    endpoint: String,
    contracts: ContractAddresses,
    from: Option<Address>,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcSettlement {
    /// Connects to `endpoint` for the given contracts.
    pub fn new(endpoint: impl Into<String>, contracts: ContractAddresses) -> Result<Self, SettlementError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SettlementError::Transport(format!("rpc client error: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            contracts,
            from: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            next_id: AtomicU64::new(1),
        })
    }

    /// Builds an adapter from client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, SettlementError> {
        let mut rpc = Self::new(config.rpc_url.clone(), config.contracts)?;
        rpc.from = config.account;
        Ok(rpc)
    }

    /// Sender for submitted transactions.
    pub fn with_sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Receipt polling cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SettlementError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(target: LOG_TARGET, method, id, evt = "REQUEST");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(format!("{method} request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SettlementError::Transport(format!("{method} status {status}: {body}")));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| SettlementError::Decode(format!("{method} decode failed: {e}")))?;
        if let Some(error) = value.get("error") {
            debug!(target: LOG_TARGET, method, error = %error, evt = "RPC_ERROR");
            return Err(map_rpc_error(error));
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| SettlementError::Decode(format!("{method} missing result")))
    }
}

/// Translates a JSON-RPC error object into the shapes the classifier knows.
fn map_rpc_error(error: &Value) -> SettlementError {
    let code = error.get("code").and_then(Value::as_i64);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown rpc error")
        .to_string();

    if code == Some(USER_REJECTED_CODE) {
        return SettlementError::Message(format!("User rejected the request. {message}"));
    }
    if let Some(data) = revert_data(error) {
        if data.len() >= 4 {
            let selector = [data[0], data[1], data[2], data[3]];
            if let Some(info) = contract_error_by_selector(selector) {
                return SettlementError::Contract {
                    name: info.name.to_string(),
                };
            }
            if let Some(reason) = abi::decode_revert_reason(&data) {
                return SettlementError::Revert {
                    short_message: format!("execution reverted: {reason}"),
                };
            }
            return SettlementError::Contract {
                name: encode_hex_prefixed(&selector),
            };
        }
    }
    SettlementError::Message(message)
}

/// Revert payload, either as `data` directly or nested one level down.
fn revert_data(error: &Value) -> Option<Vec<u8>> {
    let data = error.get("data")?;
    let text = data
        .as_str()
        .or_else(|| data.get("data").and_then(Value::as_str))?;
    decode_hex_prefixed(text).ok()
}

fn parse_quantity(text: &str) -> Result<U256, SettlementError> {
    let raw = text.strip_prefix("0x").unwrap_or(text);
    if raw.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(raw, 16).map_err(|e| SettlementError::Decode(format!("bad quantity {text}: {e:?}")))
}

fn as_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, SettlementError> {
    value
        .as_str()
        .ok_or_else(|| SettlementError::Decode(format!("{what}: expected string, got {value}")))
}

#[async_trait]
impl Settlement for JsonRpcSettlement {
    async fn read(&self, call: &ReadCall) -> Result<ReadValue, SettlementError> {
        let to = self.contracts.address_of(call.contract);
        let data = abi::encode_call(&call.signature(), &call.args);
        let mut tx = json!({
            "to": to.to_string(),
            "data": encode_hex_prefixed(&data),
        });
        if let Some(from) = self.from {
            tx["from"] = json!(from.to_string());
        }
        let result = self.call("eth_call", json!([tx, "latest"])).await?;
        let bytes = decode_hex_prefixed(as_str(&result, "eth_call")?)
            .map_err(|e| SettlementError::Decode(format!("{}: {e}", call.function)))?;
        abi::decode(&bytes, &call.returns).map_err(|e| SettlementError::Decode(format!("{}: {e}", call.function)))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<TxHandle, SettlementError> {
        let from = self
            .from
            .ok_or_else(|| SettlementError::Message("no sender account configured".into()))?;
        let to = self.contracts.address_of(request.contract);
        let data = abi::encode_call(&request.signature(), &request.args);
        let mut tx = json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "data": encode_hex_prefixed(&data),
        });
        if let Some(value) = request.value {
            tx["value"] = json!(format!("0x{:x}", value.raw()));
        }
        let result = self.call("eth_sendTransaction", json!([tx])).await?;
        Ok(TxHandle::new(as_str(&result, "eth_sendTransaction")?))
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, SettlementError> {
        loop {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([handle.as_str()]))
                .await?;
            if receipt.is_null() {
                time::sleep(self.poll_interval).await;
                continue;
            }
            let block_number = receipt
                .get("blockNumber")
                .and_then(Value::as_str)
                .and_then(|b| parse_quantity(b).ok())
                .and_then(|b| b.to_u64());
            let status = receipt.get("status").and_then(Value::as_str).unwrap_or("0x1");
            if parse_quantity(status)?.is_zero() {
                return Err(SettlementError::Revert {
                    short_message: format!("Transaction {handle} reverted on-chain."),
                });
            }
            return Ok(Receipt {
                handle: handle.clone(),
                block_number,
            });
        }
    }

    async fn native_balance(&self, account: &Address) -> Result<ScaledAmount, SettlementError> {
        let result = self
            .call("eth_getBalance", json!([account.to_string(), "latest"]))
            .await?;
        parse_quantity(as_str(&result, "eth_getBalance")?).map(ScaledAmount::from_raw)
    }
}
