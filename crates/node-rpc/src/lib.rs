//! Read-only access to a bitcoind-style full node
//!
//! This crate provides the [`NodeRpc`] capability set the explorer needs
//! (chain tip, blocks, verbose transactions, mempool) together with a
//! JSON-RPC over HTTP implementation and typed views of the node's payloads.

pub mod client;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod types;

// Re-export commonly used types
pub use client::{HttpNodeClient, NodeRpc};
pub use config::NodeConfig;
pub use error::{Result, RpcError};
pub use types::{Block, OutputDestination, Transaction, TxInput, TxOutput};

// Re-exported so consumers share one decimal type
pub use rust_decimal;
