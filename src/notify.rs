//! Notification sink and block-explorer links.

use crate::config::{MAINNET_CHAIN_ID, SEPOLIA_CHAIN_ID};
use crate::settlement::{Address, TxHandle};
use serde::Serialize;
use tracing::{error, info};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    /// Progress.
    Info,
    /// Completed.
    Success,
    /// Failed.
    Error,
}

/// Clickable action attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedAction {
    /// Button label.
    pub label: String,
    /// Target URL.
    pub url: String,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Severity.
    pub level: NotifyLevel,
    /// Headline.
    pub title: String,
    /// Body text.
    pub description: Option<String>,
    /// Optional link.
    pub action: Option<LinkedAction>,
}

impl Notification {
    /// Notification without body or link.
    pub fn new(level: NotifyLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
            action: None,
        }
    }

    /// Adds body text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a link when one is available.
    pub fn with_link(mut self, label: &str, url: Option<String>) -> Self {
        self.action = url.map(|url| LinkedAction {
            label: label.to_string(),
            url,
        });
        self
    }
}

/// Receives notifications and the state-changed cue.
pub trait NotificationSink: Send + Sync {
    /// Shows a notification.
    fn notify(&self, notification: Notification);

    /// Brief cue that on-chain state changed.
    fn pulse(&self) {}
}

/// Sink that turns notifications into tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, n: Notification) {
        let description = n.description.as_deref().unwrap_or("");
        let link = n.action.as_ref().map(|a| a.url.as_str()).unwrap_or("");
        match n.level {
            NotifyLevel::Error => {
                error!(target: "usdx::notify", title = %n.title, description, link, evt = "NOTIFY")
            }
            NotifyLevel::Info | NotifyLevel::Success => {
                info!(target: "usdx::notify", level = ?n.level, title = %n.title, description, link, evt = "NOTIFY")
            }
        }
    }

    fn pulse(&self) {
        info!(target: "usdx::notify", evt = "STATE_CHANGED");
    }
}

/// Block explorer root for a chain.
pub fn explorer_base(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        MAINNET_CHAIN_ID => Some("https://etherscan.io"),
        SEPOLIA_CHAIN_ID => Some("https://sepolia.etherscan.io"),
        _ => None,
    }
}

/// Explorer URL for a transaction.
pub fn explorer_tx_url(chain_id: u64, handle: &TxHandle) -> Option<String> {
    explorer_base(chain_id).map(|base| format!("{base}/tx/{handle}"))
}

/// Explorer URL for an account or contract.
pub fn explorer_address_url(chain_id: u64, address: &Address) -> Option<String> {
    explorer_base(chain_id).map(|base| format!("{base}/address/{address}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_links_per_chain() {
        let handle = TxHandle::new("0xabc");
        assert_eq!(
            explorer_tx_url(1, &handle).as_deref(),
            Some("https://etherscan.io/tx/0xabc")
        );
        assert_eq!(
            explorer_address_url(11_155_111, &Address::ZERO).as_deref(),
            Some("https://sepolia.etherscan.io/address/0x0000000000000000000000000000000000000000")
        );
        assert_eq!(explorer_tx_url(31_337, &handle), None);
    }

    #[test]
    fn link_is_dropped_without_url() {
        let n = Notification::new(NotifyLevel::Info, "Transaction submitted").with_link("View", None);
        assert!(n.action.is_none());
    }
}
