//! Configuration types for the ledger database

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    // Connection pool settings
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("explorer.db")
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_seconds: default_connection_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new SQLite configuration
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            sqlite_path: path.into(),
            ..Default::default()
        }
    }

    /// A private database that lives as long as its pool
    pub fn in_memory() -> Self {
        Self::sqlite(IN_MEMORY)
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path.as_os_str() == IN_MEMORY
    }

    /// Get the connection URL
    pub fn connection_url(&self) -> crate::Result<String> {
        if self.is_in_memory() {
            return Ok("sqlite::memory:".to_string());
        }
        if self.sqlite_path.as_os_str().is_empty() {
            return Err(crate::StoreError::Config(
                "SQLite path not specified".to_string(),
            ));
        }
        Ok(format!("sqlite://{}", self.sqlite_path.display()))
    }
}
