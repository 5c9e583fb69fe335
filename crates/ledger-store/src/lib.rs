//! Ledger Store Crate
//!
//! This crate persists the explorer's append-only ledger of per-address
//! credits and debits, together with the watermark of the last fully
//! indexed block, in SQLite.

pub mod config;
pub mod connection;
pub mod error;
pub mod migrations;
pub mod models;
pub mod store;

// Re-export main types
pub use config::DatabaseConfig;
pub use connection::DatabaseConnection;
pub use error::{Result, StoreError};
pub use migrations::run_migrations;
pub use models::{BalanceTotals, Direction, HistoryPage, HistoryRow, LedgerEntry};
pub use store::{LedgerStore, SqlLedgerStore};
