//! Database migrations for the ledger

use crate::connection::DatabaseConnection;
use crate::error::{Result, StoreError};

/// Schema statements, applied in order and safe to re-run.
pub const SQLITE_MIGRATION: &[&str] = &[
    // One row per committed height; MAX(height) is the watermark.
    r#"
    CREATE TABLE IF NOT EXISTS indexed_blocks (
        height INTEGER PRIMARY KEY,
        block_hash TEXT NOT NULL,
        entry_count INTEGER NOT NULL DEFAULT 0,
        indexed_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )
    "#,
    // Append-only ledger; value is in base units (1e-8 of a coin).
    r#"
    CREATE TABLE IF NOT EXISTS address_transactions (
        address TEXT NOT NULL,
        txid TEXT NOT NULL,
        value INTEGER NOT NULL CHECK (value >= 0),
        direction TEXT NOT NULL CHECK (direction IN ('received', 'sent')),
        block_height INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_address_transactions_address ON address_transactions(address, block_height)",
    "CREATE INDEX IF NOT EXISTS idx_address_transactions_height ON address_transactions(block_height)",
];

/// Run migrations against the given connection
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut tx = conn.begin().await?;
    for statement in SQLITE_MIGRATION {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Migration(format!("Failed to run migrations: {}", e)))?;
    }
    tx.commit().await?;

    log::info!("Database migrations completed successfully");
    Ok(())
}
