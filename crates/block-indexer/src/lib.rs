//! Block Indexer Crate
//!
//! This crate turns node blocks into ledger entries. It provides the
//! derived-metrics calculator, the indexer that replays blocks into a
//! [`ledger_store::LedgerStore`], and a scheduled service that drives it.

pub mod calculator;
pub mod config;
pub mod error;
pub mod events;
pub mod indexer;
pub mod retry;
pub mod service;

// Re-export main types
pub use calculator::{
    attribute_fees_to_coinbase, fee_per_byte, ledger_entries_for_transaction, resolve_input,
    resolved_input_values, time_to_mine, total_output_value, transaction_fee, ResolvedInput,
    TransactionFeeSummary, TxFee,
};
pub use config::IndexerConfig;
pub use error::{BlockIndexerError, Result};
pub use events::{BlockIndexedEvent, ChainRewoundEvent, EventEmitter, EventSubscriber, IndexerEvent};
pub use indexer::{BlockIndexer, CycleReport};
pub use retry::RetryPolicy;
pub use service::{IndexerHandle, IndexerService};
