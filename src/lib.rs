#![warn(clippy::all)]

//! Chain explorer core
//!
//! Wires the node client, the ledger store and the block indexer together
//! and answers the explorer's read-side questions: balances, histories,
//! search, and live block/transaction views.

pub mod config;
pub mod error;
pub mod live;
pub mod query;

pub use config::{ExplorerConfig, ExplorerSettings};
pub use error::{ExplorerError, Result};
pub use live::{
    BlockDetail, BlockPage, BlockSummary, InputDetail, LiveExplorer, MempoolTransaction,
    OutputDetail, TransactionDetail, TransactionSummary,
};
pub use query::{AddressBalance, AddressHistory, QueryService, SearchResult};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` level.
///
/// Records from crates logging through `log` are forwarded as well. Calling
/// this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
