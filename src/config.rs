//! Client configuration: endpoint, chain, contract addresses, timings.

use crate::settlement::{Address, ContractId};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Ethereum mainnet.
pub const MAINNET_CHAIN_ID: u64 = 1;
/// Sepolia testnet.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable holds text that does not parse.
    #[error("invalid value for {key}: {value}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Offending text.
        value: String,
    },
}

/// Deployed protocol contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContractAddresses {
    /// USDX token.
    pub stable_coin: Address,
    /// Bonding curve.
    pub bonding_curve: Address,
    /// Reserve manager.
    pub reserve_manager: Address,
    /// Staking rewards.
    pub staking_rewards: Address,
}

impl ContractAddresses {
    /// Address of a protocol contract.
    pub fn address_of(&self, contract: ContractId) -> Address {
        match contract {
            ContractId::StableCoin => self.stable_coin,
            ContractId::BondingCurve => self.bonding_curve,
            ContractId::ReserveManager => self.reserve_manager,
            ContractId::StakingRewards => self.staking_rewards,
        }
    }
}

/// How often each group of reads goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshIntervals {
    /// Balances.
    pub fast: Duration,
    /// Protocol stats and staking position.
    pub medium: Duration,
    /// Unstake queue.
    pub slow: Duration,
    /// Quotes.
    pub quote: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(12),
            medium: Duration::from_secs(30),
            slow: Duration::from_secs(60),
            quote: Duration::from_secs(15),
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Chain id, also selects the explorer.
    pub chain_id: u64,
    /// Protocol contracts.
    pub contracts: ContractAddresses,
    /// Sender and owner of reads keyed by account.
    pub account: Option<Address>,
    /// Upper bound on a confirmation wait.
    pub confirmation_timeout: Duration,
    /// Staleness of cached reads.
    pub refresh: RefreshIntervals,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: SEPOLIA_CHAIN_ID,
            contracts: ContractAddresses::default(),
            account: None,
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            refresh: RefreshIntervals::default(),
        }
    }
}

impl ClientConfig {
    /// Reads `USDX_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup; unset or blank
    /// keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("USDX_RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(raw) = get("USDX_CHAIN_ID") {
            config.chain_id = parse_u64("USDX_CHAIN_ID", &raw)?;
        }
        if let Some(raw) = get("USDX_CONFIRMATION_TIMEOUT_SECS") {
            let secs = parse_u64("USDX_CONFIRMATION_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "USDX_CONFIRMATION_TIMEOUT_SECS",
                    value: raw,
                });
            }
            config.confirmation_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("USDX_ACCOUNT") {
            config.account = Some(parse_address("USDX_ACCOUNT", &raw)?);
        }

        let slots: [(&'static str, &mut Address); 4] = [
            ("USDX_STABLECOIN_ADDRESS", &mut config.contracts.stable_coin),
            ("USDX_BONDING_CURVE_ADDRESS", &mut config.contracts.bonding_curve),
            ("USDX_RESERVE_MANAGER_ADDRESS", &mut config.contracts.reserve_manager),
            ("USDX_STAKING_REWARDS_ADDRESS", &mut config.contracts.staking_rewards),
        ];
        for (key, slot) in slots {
            if let Some(raw) = get(key) {
                *slot = parse_address(key, &raw)?;
            }
        }
        Ok(config)
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_address(key: &'static str, raw: &str) -> Result<Address, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.chain_id, SEPOLIA_CHAIN_ID);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(600));
        assert_eq!(config.refresh.quote, Duration::from_secs(15));
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("USDX_RPC_URL", "https://rpc.example"),
            ("USDX_CHAIN_ID", "1"),
            ("USDX_BONDING_CURVE_ADDRESS", "0x00000000000000000000000000000000000000b0"),
            ("USDX_CONFIRMATION_TIMEOUT_SECS", "30"),
            ("USDX_ACCOUNT", " "),
        ]))
        .unwrap();
        assert_eq!(config.rpc_url, "https://rpc.example");
        assert_eq!(config.chain_id, MAINNET_CHAIN_ID);
        assert_eq!(config.contracts.address_of(ContractId::BondingCurve).as_bytes()[19], 0xb0);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
        assert_eq!(config.account, None);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = ClientConfig::from_lookup(lookup(&[("USDX_CHAIN_ID", "sepolia")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "USDX_CHAIN_ID",
                value: "sepolia".into()
            }
        );
        assert!(ClientConfig::from_lookup(lookup(&[("USDX_STABLECOIN_ADDRESS", "0x12")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("USDX_CONFIRMATION_TIMEOUT_SECS", "0")])).is_err());
    }
}
