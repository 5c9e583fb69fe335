//! The ledger store: append-only entries plus the indexing watermark

use async_trait::async_trait;
use sqlx::{Row, Sqlite};

use crate::connection::DatabaseConnection;
use crate::error::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::models::{from_base_units, to_base_units, BalanceTotals, HistoryPage, HistoryRow, LedgerEntry};

/// Persistence the indexer writes to and the query layer reads from.
///
/// A single writer and many concurrent readers are supported. Readers observe
/// a block's entries and the watermark covering them together or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Highest fully committed height, 0 when nothing is indexed.
    async fn watermark(&self) -> Result<u64>;

    /// Hash recorded when `height` was committed.
    async fn indexed_block_hash(&self, height: u64) -> Result<Option<String>>;

    /// Persist every entry for `height` and advance the watermark, atomically.
    ///
    /// Fails with [`StoreError::HeightNotAhead`] if `height` is already covered.
    async fn commit_block(&self, height: u64, block_hash: &str, entries: &[LedgerEntry]) -> Result<()>;

    /// Purge everything above `height` and move the watermark back to it.
    /// Returns the number of entries removed.
    async fn rewind_to(&self, height: u64) -> Result<u64>;

    async fn query_balance(&self, address: &str) -> Result<BalanceTotals>;

    /// Entries for `address` grouped by transaction, direction and height,
    /// newest first.
    async fn query_history(&self, address: &str, offset: u64, limit: u64) -> Result<Vec<HistoryRow>>;

    async fn count_distinct_txids(&self, address: &str) -> Result<u64>;

    /// One history page and the distinct-transaction total, read from a
    /// single snapshot so the two always agree.
    async fn query_history_page(&self, address: &str, offset: u64, limit: u64) -> Result<HistoryPage>;

    async fn entries_at_height(&self, height: u64) -> Result<Vec<LedgerEntry>>;
}

/// SQLite-backed [`LedgerStore`].
pub struct SqlLedgerStore {
    db: DatabaseConnection,
}

impl SqlLedgerStore {
    /// Wrap a connection, creating the schema if needed
    pub async fn new(db: DatabaseConnection) -> Result<Self> {
        run_migrations(&db).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn sql_int(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} does not fit in a column", value)))
}

fn row_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative value {} in a height column", value)))
}

async fn watermark_with<'e, E>(executor: E) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(height), 0) FROM indexed_blocks")
        .fetch_one(executor)
        .await?;
    row_u64(max)
}

async fn history_with<'e, E>(executor: E, address: &str, offset: u64, limit: u64) -> Result<Vec<HistoryRow>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT txid, direction, SUM(value) AS value, block_height \
         FROM address_transactions \
         WHERE address = ? \
         GROUP BY txid, direction, block_height \
         ORDER BY block_height DESC, txid ASC, direction ASC \
         LIMIT ? OFFSET ?",
    )
    .bind(address)
    .bind(sql_int(limit)?)
    .bind(sql_int(offset)?)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| -> Result<HistoryRow> {
            let direction: String = row.try_get("direction")?;
            Ok(HistoryRow {
                txid: row.try_get("txid")?,
                direction: direction.parse()?,
                value: from_base_units(row.try_get("value")?),
                block_height: row_u64(row.try_get("block_height")?)?,
            })
        })
        .collect()
}

async fn distinct_txids_with<'e, E>(executor: E, address: &str) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT txid) FROM address_transactions WHERE address = ?")
        .bind(address)
        .fetch_one(executor)
        .await?;
    row_u64(count)
}

#[async_trait]
impl LedgerStore for SqlLedgerStore {
    async fn watermark(&self) -> Result<u64> {
        watermark_with(self.db.pool()).await
    }

    async fn indexed_block_hash(&self, height: u64) -> Result<Option<String>> {
        let hash = sqlx::query_scalar("SELECT block_hash FROM indexed_blocks WHERE height = ?")
            .bind(sql_int(height)?)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(hash)
    }

    async fn commit_block(&self, height: u64, block_hash: &str, entries: &[LedgerEntry]) -> Result<()> {
        // Dropping `tx` on any early return rolls the whole block back.
        let mut tx = self.db.begin().await?;

        let watermark = watermark_with(&mut *tx).await?;
        if height <= watermark {
            return Err(StoreError::HeightNotAhead { height, watermark });
        }

        for entry in entries {
            if entry.block_height != height {
                return Err(StoreError::Corrupt(format!(
                    "entry for height {} in commit of height {}",
                    entry.block_height, height
                )));
            }
            sqlx::query(
                "INSERT INTO address_transactions (address, txid, value, direction, block_height) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&entry.address)
            .bind(&entry.txid)
            .bind(to_base_units(entry.value)?)
            .bind(entry.direction.as_str())
            .bind(sql_int(height)?)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO indexed_blocks (height, block_hash, entry_count) VALUES (?, ?, ?)")
            .bind(sql_int(height)?)
            .bind(block_hash)
            .bind(sql_int(entries.len() as u64)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        log::debug!("Committed {} ledger entries at height {}", entries.len(), height);
        Ok(())
    }

    async fn rewind_to(&self, height: u64) -> Result<u64> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM address_transactions WHERE block_height > ?")
            .bind(sql_int(height)?)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM indexed_blocks WHERE height > ?")
            .bind(sql_int(height)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        log::info!("Rewound ledger to height {} ({} entries removed)", height, removed);
        Ok(removed)
    }

    async fn query_balance(&self, address: &str) -> Result<BalanceTotals> {
        let row = sqlx::query(
            "SELECT \
                COALESCE(SUM(CASE WHEN direction = 'received' THEN value ELSE 0 END), 0) AS received, \
                COALESCE(SUM(CASE WHEN direction = 'sent' THEN value ELSE 0 END), 0) AS sent \
             FROM address_transactions WHERE address = ?",
        )
        .bind(address)
        .fetch_one(self.db.pool())
        .await?;

        Ok(BalanceTotals {
            received: from_base_units(row.try_get("received")?),
            sent: from_base_units(row.try_get("sent")?),
        })
    }

    async fn query_history(&self, address: &str, offset: u64, limit: u64) -> Result<Vec<HistoryRow>> {
        history_with(self.db.pool(), address, offset, limit).await
    }

    async fn count_distinct_txids(&self, address: &str) -> Result<u64> {
        distinct_txids_with(self.db.pool(), address).await
    }

    async fn query_history_page(&self, address: &str, offset: u64, limit: u64) -> Result<HistoryPage> {
        // Under WAL the snapshot is taken at the first read and held until
        // the transaction ends, so a commit in between is not seen.
        let mut tx = self.db.begin().await?;
        let rows = history_with(&mut *tx, address, offset, limit).await?;
        let total_txids = distinct_txids_with(&mut *tx, address).await?;
        tx.commit().await?;
        Ok(HistoryPage { rows, total_txids })
    }

    async fn entries_at_height(&self, height: u64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT address, txid, value, direction FROM address_transactions WHERE block_height = ? ORDER BY rowid",
        )
        .bind(sql_int(height)?)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<LedgerEntry> {
                let direction: String = row.try_get("direction")?;
                Ok(LedgerEntry {
                    address: row.try_get("address")?,
                    txid: row.try_get("txid")?,
                    value: from_base_units(row.try_get("value")?),
                    direction: direction.parse()?,
                    block_height: height,
                })
            })
            .collect()
    }
}
