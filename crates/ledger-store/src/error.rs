//! Error types for the ledger store

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Height {height} is not ahead of watermark {watermark}")]
    HeightNotAhead { height: u64, watermark: u64 },

    #[error("Value out of range: {0}")]
    ValueOutOfRange(Decimal),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
