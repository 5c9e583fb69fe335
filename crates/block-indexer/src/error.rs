//! Error types for the block indexer

use ledger_store::StoreError;
use node_rpc::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockIndexerError {
    #[error("Node RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: RpcError,
    },

    #[error("Chain diverges more than {max_depth} blocks below height {height}")]
    ReorgTooDeep { height: u64, max_depth: u64 },

    #[error("Event system error: {0}")]
    EventSystem(String),

    #[error("Indexer task failed: {0}")]
    Task(String),
}

impl BlockIndexerError {
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, BlockIndexerError::RetriesExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, BlockIndexerError>;
