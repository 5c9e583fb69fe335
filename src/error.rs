use block_indexer::BlockIndexerError;
use ledger_store::StoreError;
use node_rpc::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Node RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Indexer error: {0}")]
    Indexer(#[from] BlockIndexerError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ExplorerError {
    /// The node was unreachable; the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExplorerError::Rpc(e) => e.is_transient(),
            ExplorerError::Indexer(e) => e.is_retries_exhausted(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExplorerError::Rpc(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
