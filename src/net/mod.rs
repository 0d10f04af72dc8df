//! Network adapters for the settlement layer.
//!
//! Gated behind the `rpc` Cargo feature so the core library builds without
//! an HTTP stack.

#![cfg(feature = "rpc")]

/// Ethereum JSON-RPC implementation of [`crate::settlement::Settlement`].
pub mod rpc;

pub use rpc::JsonRpcSettlement;
