//! Database connection pool

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use std::str::FromStr;
use std::time::Duration;

use crate::{config::DatabaseConfig, error::Result};

/// Main database connection structure
pub struct DatabaseConnection {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl DatabaseConnection {
    /// Create a new database connection
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let mut options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        pool_options = if config.is_in_memory() {
            // Every connection to :memory: opens its own database, so the
            // pool must hold exactly one and never recycle it.
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            // WAL lets readers proceed while the indexer holds a write transaction.
            options = options.journal_mode(SqliteJournalMode::Wal);
            pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        };

        let pool = pool_options.connect_with(options).await?;
        log::info!("Opened ledger database at {}", url);

        Ok(Self { pool, config })
    }

    /// Create a new connection with the default configuration
    pub async fn default_sqlite() -> Result<Self> {
        Self::new(DatabaseConfig::default()).await
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction; it rolls back if dropped before commit
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Check if the connection is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Close all connections in the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
